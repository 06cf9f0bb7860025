use std::{convert::Infallible, net::SocketAddr};

use bytes::Bytes;
use futures_util::StreamExt;
use http_body_util::{BodyStream, Full};
use hyper::{body::Incoming, Request, Response, StatusCode};
// Import the reqparser types.
use reqparser::{Body, ConnectionInfo, Options, ReqParser, Storage};

// A handler for incoming requests.
async fn handle(parser: ReqParser, req: Request<Incoming>) -> Result<Response<Full<Bytes>>, Infallible> {
    // Hand hyper's body frames over as a plain stream of data chunks.
    let (parts, body) = req.into_parts();
    let body_stream = BodyStream::new(body)
        .filter_map(|result| async move { result.map(|frame| frame.into_data().ok()).transpose() });

    let mut req = Request::from_parts(parts, Body::wrap_stream(body_stream));
    req.extensions_mut().insert(ConnectionInfo { encrypted: false });

    let ctx = match parser.parse(req).await {
        Ok(ctx) => ctx,
        Err(err) => {
            // Whatever made it to disk before the failure still has to go.
            let (err, ctx) = err.into_parts();
            parser.clean(&ctx);
            return Ok(Response::builder()
                .status(StatusCode::INTERNAL_SERVER_ERROR)
                .body(Full::from(format!("INTERNAL SERVER ERROR: {}", err)))
                .unwrap());
        }
    };

    let mut summary = format!("URL: {}\n", ctx.parsed_url());

    if let Some(fields) = ctx.form_fields() {
        for (name, value) in fields {
            summary.push_str(&format!("Field {:?}: {:?}\n", name, value));
        }
    }

    if let Some(files) = ctx.form_files() {
        for (name, entry) in files {
            for file in entry.descriptors() {
                summary.push_str(&format!(
                    "File {:?}: {:?} ({}, {:?})\n",
                    name,
                    file.filename(),
                    file.mimetype(),
                    file.path()
                ));
            }
        }
    }

    if ctx.form_fields().is_none() {
        let len = ctx.read_raw_body().await.ok().flatten().map(|b| b.len()).unwrap_or(0);
        summary.push_str(&format!("Raw body: {} bytes\n", len));
    }

    // Don't wait for the files to be removed.
    parser.clean(&ctx);

    Ok(Response::new(Full::from(summary)))
}

#[tokio::main]
async fn main() {
    // `REQPARSER_STORAGE` is either "memory" or an upload directory.
    let storage = std::env::var("REQPARSER_STORAGE")
        .unwrap_or_else(|_| "memory".to_owned())
        .parse::<Storage>()
        .unwrap();
    let parser = ReqParser::new(Options::new().storage(storage));

    let addr = SocketAddr::from(([127, 0, 0, 1], 3000));
    let listener = tokio::net::TcpListener::bind(addr).await.unwrap();
    println!("Server running at: {}", addr);

    loop {
        let (socket, _remote_addr) = listener.accept().await.unwrap();
        let socket = hyper_util::rt::TokioIo::new(socket);
        let parser = parser.clone();

        tokio::spawn(async move {
            let service = hyper::service::service_fn(move |req| handle(parser.clone(), req));
            if let Err(e) = hyper::server::conn::http1::Builder::new()
                .serve_connection(socket, service)
                .await
            {
                eprintln!("server error: {}", e);
            }
        });
    }
}
