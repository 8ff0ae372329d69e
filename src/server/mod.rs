//! Live snapshot server.
//!
//! One background thread, one connection at a time: accept, read a single
//! bounded chunk of the request, answer with either the latest annotated
//! frame as JPEG or the viewer page, close. There are no error responses;
//! a client gets a 200 or a closed connection.

use std::io::{ErrorKind, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};

use crate::annotate::{render_snapshot, JPEG_QUALITY};
use crate::detect::ClassNames;
use crate::frame::{Frame, PixelOrder};
use crate::shared::{SharedFrameState, Snapshot};
use crate::shutdown::Shutdown;

pub const WEB_PORT: u16 = 8080;

/// Bytes read from each request. Longer requests are truncated.
pub const READ_BUFFER_BYTES: usize = 1024;

/// Request prefix that selects the image resource.
const IMAGE_REQUEST: &[u8] = b"GET /image.jpg";

const ACCEPT_POLL: Duration = Duration::from_millis(50);

pub const VIEWER_HTML: &str = "<html><head><title>Object Detection</title></head><body>\
<h1>Live Object Detection</h1>\
<img src='/image.jpg' style='width:640px;'/>\
<script>\
setInterval(function(){\
  document.querySelector('img').src = '/image.jpg?' + Date.now();\
}, 100);\
</script>\
</body></html>";

#[derive(Clone, Debug)]
pub struct SnapshotServerConfig {
    pub addr: String,
    pub jpeg_quality: u8,
    /// Frame served before anything has been published.
    pub placeholder_width: u32,
    pub placeholder_height: u32,
}

impl Default for SnapshotServerConfig {
    fn default() -> Self {
        Self {
            addr: format!("0.0.0.0:{WEB_PORT}"),
            jpeg_quality: JPEG_QUALITY,
            placeholder_width: 720,
            placeholder_height: 480,
        }
    }
}

#[derive(Debug)]
pub struct SnapshotHandle {
    pub addr: SocketAddr,
    shutdown: Shutdown,
    join: Option<JoinHandle<()>>,
}

impl SnapshotHandle {
    /// Stop accepting and join the server thread.
    ///
    /// A connection in progress is finished first.
    pub fn stop(mut self) -> Result<()> {
        self.shutdown.trigger();
        if let Some(join) = self.join.take() {
            join.join()
                .map_err(|_| anyhow!("snapshot server thread panicked"))?;
        }
        Ok(())
    }
}

pub struct SnapshotServer {
    cfg: SnapshotServerConfig,
    state: Arc<SharedFrameState>,
    classes: Arc<dyn ClassNames>,
}

impl SnapshotServer {
    pub fn new(
        cfg: SnapshotServerConfig,
        state: Arc<SharedFrameState>,
        classes: Arc<dyn ClassNames>,
    ) -> Self {
        Self {
            cfg,
            state,
            classes,
        }
    }

    /// Bind the listener and start serving on a background thread.
    pub fn spawn(self) -> Result<SnapshotHandle> {
        let configured_addr: SocketAddr = self
            .cfg
            .addr
            .parse()
            .with_context(|| format!("invalid web address '{}'", self.cfg.addr))?;
        let listener = TcpListener::bind(configured_addr)
            .with_context(|| format!("bind snapshot server on {}", configured_addr))?;
        listener.set_nonblocking(true)?;
        let addr = listener.local_addr()?;

        let shutdown = Shutdown::new();
        let shutdown_thread = shutdown.clone();
        let join = std::thread::Builder::new()
            .name("snapshot-server".to_string())
            .spawn(move || serve(listener, &self, &shutdown_thread))
            .context("spawn snapshot server thread")?;

        Ok(SnapshotHandle {
            addr,
            shutdown,
            join: Some(join),
        })
    }

    fn latest(&self) -> Result<Snapshot> {
        match self.state.snapshot() {
            Some(snapshot) => Ok(snapshot),
            None => Ok(Snapshot {
                generation: 0,
                frame: Frame::black(
                    self.cfg.placeholder_width,
                    self.cfg.placeholder_height,
                    PixelOrder::Rgb,
                )?,
                detections: Vec::new(),
            }),
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Route {
    Image,
    Viewer,
}

/// Pick the resource from whatever part of the request was read.
pub fn route(request: &[u8]) -> Route {
    if request
        .windows(IMAGE_REQUEST.len())
        .any(|w| w == IMAGE_REQUEST)
    {
        Route::Image
    } else {
        Route::Viewer
    }
}

fn serve(listener: TcpListener, server: &SnapshotServer, shutdown: &Shutdown) {
    log::info!(
        "snapshot server listening on {}",
        listener
            .local_addr()
            .map(|a| a.to_string())
            .unwrap_or_else(|_| server.cfg.addr.clone())
    );
    while !shutdown.is_triggered() {
        match listener.accept() {
            Ok((stream, peer)) => {
                if let Err(err) = handle_connection(stream, server) {
                    log::warn!("snapshot client {} dropped: {:#}", peer, err);
                }
            }
            Err(err) if err.kind() == ErrorKind::WouldBlock => {
                std::thread::sleep(ACCEPT_POLL);
            }
            Err(err) => {
                log::error!("snapshot server accept failed: {}", err);
            }
        }
    }
    log::info!("snapshot server stopped");
}

fn handle_connection(mut stream: TcpStream, server: &SnapshotServer) -> Result<()> {
    stream.set_nonblocking(false)?;
    let mut buf = [0u8; READ_BUFFER_BYTES];
    let n = stream.read(&mut buf).context("read request")?;
    if n == 0 {
        return Ok(());
    }

    match route(&buf[..n]) {
        Route::Image => {
            let snapshot = server.latest()?;
            let body = render_snapshot(&snapshot, server.classes.as_ref(), server.cfg.jpeg_quality)?;
            write_response(&mut stream, "image/jpeg", &body)?;
            log::debug!(
                "served generation {} ({} bytes)",
                snapshot.generation,
                body.len()
            );
        }
        Route::Viewer => {
            write_response(&mut stream, "text/html", VIEWER_HTML.as_bytes())?;
        }
    }

    stream.flush()?;
    let _ = stream.shutdown(std::net::Shutdown::Write);
    discard_pending(&mut stream);
    Ok(())
}

fn write_response(stream: &mut TcpStream, content_type: &str, body: &[u8]) -> Result<()> {
    let header = format!(
        "HTTP/1.1 200 OK\r\nContent-Type: {content_type}\r\nContent-Length: {len}\r\nConnection: close\r\n\r\n",
        content_type = content_type,
        len = body.len()
    );
    stream.write_all(header.as_bytes())?;
    stream.write_all(body)?;
    Ok(())
}

/// Drop request bytes that already arrived beyond the read bound, without
/// waiting for more. Closing with unread data would reset the connection.
fn discard_pending(stream: &mut TcpStream) {
    if stream.set_nonblocking(true).is_err() {
        return;
    }
    let mut sink = [0u8; READ_BUFFER_BYTES];
    loop {
        match stream.read(&mut sink) {
            Ok(0) => break,
            Ok(_) => continue,
            Err(err) if err.kind() == ErrorKind::Interrupted => continue,
            Err(_) => break,
        }
    }
}
