//! `multipart/x-mixed-replace` framing for MJPEG streams.
//!
//! Browsers render each part in place of the previous one, so pointing an
//! `<img>` at the stream is enough to show live video.

use bytes::{BufMut, Bytes, BytesMut};

/// Boundary token declared in the stream's content type.
pub const DEFAULT_BOUNDARY: &str = "jpgboundary";

/// Value of the `Content-Type` header for a stream using `boundary`.
pub fn content_type(boundary: &str) -> String {
    format!("multipart/x-mixed-replace; boundary={boundary}")
}

/// One complete part: boundary marker, headers, blank line, JPEG bytes.
pub fn encode_part(boundary: &str, jpeg: &[u8]) -> Bytes {
    let header = format!(
        "--{boundary}\r\n\
         Content-type: image/jpeg\r\n\
         Content-length: {len}\r\n\
         \r\n",
        len = jpeg.len()
    );

    let mut part = BytesMut::with_capacity(header.len() + jpeg.len() + 2);
    part.put_slice(header.as_bytes());
    part.put_slice(jpeg);
    part.put_slice(b"\r\n");
    part.freeze()
}

/// Minimal viewer page served for every non-stream request.
pub fn viewer_page(stream_path: &str) -> String {
    format!(
        "<html><head></head><body>\n  <img src=\"{stream_path}\"/>\n</body></html>\n"
    )
}
