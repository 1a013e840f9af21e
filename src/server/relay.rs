//! Forwards generated fragments to the HTTP response as they arrive.

use axum::body::Body;
use axum::http::{ header, HeaderValue, StatusCode };
use axum::response::{ IntoResponse, Response };
use futures::StreamExt;
use log::{ info, warn };
use std::error::Error as StdError;
use std::io;

use crate::llm::chat::{ create_streaming_response, TokenStream };
use crate::models::stream::{ StreamPart, StreamProtocol };

/// Wraps `tokens` in a streaming `200 OK` response framed per `protocol`.
///
/// Fragments are never buffered beyond the relay channel. With the data
/// protocol a generation failure becomes an error part; with the text
/// protocol it aborts the body so the caller observes a truncated stream.
pub fn relay_response(tokens: TokenStream, protocol: StreamProtocol, request_id: String) -> Response {
    let framed = frame(tokens, protocol, request_id);

    let mut response = (StatusCode::OK, Body::from_stream(framed)).into_response();
    let headers = response.headers_mut();
    headers.insert(header::CONTENT_TYPE, HeaderValue::from_static("text/plain; charset=utf-8"));
    headers.insert(header::CACHE_CONTROL, HeaderValue::from_static("no-cache"));
    if protocol == StreamProtocol::Data {
        headers.insert(StreamProtocol::DATA_STREAM_HEADER, HeaderValue::from_static("v1"));
    }
    response
}

fn frame(mut tokens: TokenStream, protocol: StreamProtocol, request_id: String) -> TokenStream {
    create_streaming_response(move |tx| async move {
        let mut fragments = 0usize;
        while let Some(item) = tokens.next().await {
            match item {
                Ok(text) => {
                    fragments += 1;
                    let frame = match protocol {
                        StreamProtocol::Data => StreamPart::Text(text).encode(),
                        StreamProtocol::Text => text,
                    };
                    if tx.send(Ok(frame)).await.is_err() {
                        info!("[{}] Client disconnected after {} fragment(s)", request_id, fragments);
                        return;
                    }
                }
                Err(e) => {
                    warn!("[{}] Generation stream failed after {} fragment(s): {}", request_id, fragments, e);
                    let _ = match protocol {
                        StreamProtocol::Data => tx.send(Ok(StreamPart::Error(e.to_string()).encode())).await,
                        StreamProtocol::Text => tx.send(Err(stream_aborted(e))).await,
                    };
                    return;
                }
            }
        }
        if protocol == StreamProtocol::Data {
            let _ = tx.send(Ok(StreamPart::Finish.encode())).await;
        }
        info!("[{}] Answer streamed: {} fragment(s)", request_id, fragments);
    })
}

fn stream_aborted(cause: Box<dyn StdError + Send + Sync>) -> Box<dyn StdError + Send + Sync> {
    Box::new(io::Error::new(io::ErrorKind::Other, format!("generation stream aborted: {}", cause)))
}
