use crate::multipart::buffer::StreamBuffer;

pub(crate) struct MultipartState {
    pub(crate) buffer: StreamBuffer,
    pub(crate) boundary: String,
    pub(crate) stage: StreamingStage,
    pub(crate) next_part_idx: usize,
    pub(crate) curr_part_name: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum StreamingStage {
    FindingFirstBoundary,
    ReadingBoundary,
    DeterminingBoundaryType,
    ReadingTransportPadding,
    ReadingPartHeaders,
    ReadingPartData,
    Eof,
}
