//! Development server with asset-aware restarts.
//!
//! A lightweight static file server built on `tiny_http`:
//!
//! - Static file serving from `[serve] root`
//! - Automatic `index.html` resolution for directories
//! - Image watching via [`crate::watch`], restarting on asset changes
//! - Graceful shutdown on Ctrl+C
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────┐  restart()  ┌──────────────────┐
//! │   Main Thread   │◀────────────│  Watcher Thread  │
//! │  (HTTP Server)  │             │  (Image Monitor) │
//! └────────┬────────┘             └────────┬─────────┘
//!          │                               │
//!          ▼                               ▼
//!    Serve requests                 Rebuild, sync,
//!    Rebind on restart              remove stale assets
//! ```

use crate::{
    asset::AssetSync,
    config::ProjectConfig,
    log,
    session::Session,
    watch::{ChangeHandler, watch_and_sync},
};
use anyhow::{Context, Result, anyhow};
use parking_lot::Mutex;
use std::{
    fs,
    io::Cursor,
    net::{IpAddr, SocketAddr},
    path::{Component, Path, PathBuf},
    sync::{
        Arc,
        atomic::{AtomicBool, Ordering},
    },
    thread,
    time::Duration,
};
use tiny_http::{Header, Request, Response, Server, StatusCode};

/// Try binding to port, retry with incremented port if in use
const MAX_PORT_RETRIES: u16 = 10;

/// Attempts to reclaim the address after a restart
const MAX_REBIND_RETRIES: u32 = 20;
const REBIND_DELAY: Duration = Duration::from_millis(50);

// ============================================================================
// Server Entry Point
// ============================================================================

/// Start the development server.
///
/// This function:
/// 1. Runs one synchronization pass
/// 2. Binds to the configured interface and port (with auto-retry on port conflict)
/// 3. Sets up Ctrl+C handler for graceful shutdown
/// 4. Starts the image watcher (if enabled), handing it this server as its session
/// 5. Enters the request loop
///
/// The server blocks until Ctrl+C is received. The watcher is torn down on exit.
pub fn serve_site(config: &ProjectConfig) -> Result<()> {
    let interface: IpAddr = config
        .serve
        .interface
        .parse()
        .with_context(|| format!("Invalid interface `{}`", config.serve.interface))?;

    let sync = AssetSync::from_config(config);
    sync.run();

    let (server, addr) = try_bind_port(interface, config.serve.port, MAX_PORT_RETRIES)?;
    let handle = Arc::new(ServerHandle::new(server));

    let for_signal = Arc::clone(&handle);
    ctrlc::set_handler(move || {
        log!("serve"; "shutting down...");
        for_signal.close();
    })
    .context("Failed to set Ctrl+C handler")?;

    let watcher = if config.serve.watch {
        let session: Arc<dyn Session> = handle.clone();
        let handler = ChangeHandler::from_config(config, session)?;
        match watch_and_sync(&config.sync.content, sync.allow().clone(), handler) {
            Ok(watcher) => {
                log!("watch"; "watching {}", config.sync.content.display());
                Some(watcher)
            }
            Err(e) => {
                log!("watch"; "{e:#}");
                None
            }
        }
    } else {
        None
    };

    log!("serve"; "http://{}", addr);
    let result = handle.run(addr, &config.serve.root);

    drop(watcher);
    result
}

/// Try to bind to a port, retrying with incremented port numbers if in use.
fn try_bind_port(interface: IpAddr, base_port: u16, max_retries: u16) -> Result<(Server, SocketAddr)> {
    let mut last_error = None;

    for offset in 0..max_retries {
        let port = base_port.saturating_add(offset);
        let addr = SocketAddr::new(interface, port);

        match Server::http(addr) {
            Ok(server) => {
                if offset > 0 {
                    log!("serve"; "port {} in use, using {} instead", base_port, port);
                }
                return Ok((server, addr));
            }
            Err(e) => last_error = Some(e),
        }
    }

    Err(anyhow!(
        "Failed to bind after {} attempts (ports {}-{}): {}",
        max_retries,
        base_port,
        base_port.saturating_add(max_retries.saturating_sub(1)),
        last_error.map_or_else(|| "no attempts made".to_string(), |e| e.to_string())
    ))
}

// ============================================================================
// Session
// ============================================================================

/// The live server, shared with the watcher as its [`Session`].
///
/// `restart` and `close` unblock the accept loop; the loop then either rebinds
/// the same address or returns.
pub struct ServerHandle {
    server: Mutex<Option<Arc<Server>>>,
    restart: AtomicBool,
    closed: AtomicBool,
}

impl ServerHandle {
    pub fn new(server: Server) -> Self {
        Self {
            server: Mutex::new(Some(Arc::new(server))),
            restart: AtomicBool::new(false),
            closed: AtomicBool::new(false),
        }
    }

    /// Stop accepting requests and make [`ServerHandle::run`] return.
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.unblock();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    fn unblock(&self) {
        if let Some(server) = self.server.lock().as_ref() {
            server.unblock();
        }
    }

    fn current(&self) -> Option<Arc<Server>> {
        self.server.lock().clone()
    }

    /// Release the listener and bind `addr` again.
    fn rebind(&self, addr: SocketAddr) -> Result<()> {
        drop(self.server.lock().take());

        let mut attempt = 0;
        let server = loop {
            match Server::http(addr) {
                Ok(server) => break server,
                Err(_) if attempt + 1 < MAX_REBIND_RETRIES => {
                    attempt += 1;
                    thread::sleep(REBIND_DELAY);
                }
                Err(e) => return Err(anyhow!("Failed to rebind {addr}: {e}")),
            }
        };

        *self.server.lock() = Some(Arc::new(server));
        Ok(())
    }

    /// Serve `root` until closed, rebinding `addr` whenever a restart is requested.
    pub fn run(&self, addr: SocketAddr, root: &Path) -> Result<()> {
        while let Some(server) = self.current() {
            if self.is_closed() {
                break;
            }
            for request in server.incoming_requests() {
                if let Err(e) = handle_request(request, root) {
                    log!("serve"; "request error: {e}");
                }
            }
            drop(server);

            if self.is_closed() {
                break;
            }
            if self.restart.swap(false, Ordering::SeqCst) {
                self.rebind(addr)?;
                log!("serve"; "restarted on http://{}", addr);
                continue;
            }
            break;
        }

        drop(self.server.lock().take());
        Ok(())
    }
}

impl Session for ServerHandle {
    fn restart(&self) {
        if self.is_closed() {
            return;
        }
        self.restart.store(true, Ordering::SeqCst);
        self.unblock();
    }
}

// ============================================================================
// Request Handling
// ============================================================================

/// Handle a single HTTP request.
///
/// Request resolution order:
/// 1. Exact file match → serve file
/// 2. Directory with index.html → serve index.html
/// 3. Nothing found → 404
fn handle_request(request: Request, root: &Path) -> Result<()> {
    match resolve_path(root, request.url()) {
        Some(path) => serve_file(request, &path),
        None => serve_not_found(request),
    }
}

/// Map a request URL onto a file under `root`.
///
/// The URL is percent-decoded and its query string stripped, so cache-busting
/// URLs like `diagram.png?t=123` resolve. Paths escaping `root` never resolve.
fn resolve_path(root: &Path, url: &str) -> Option<PathBuf> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let decoded = urlencoding::decode(path).ok()?;
    let request_path = Path::new(decoded.trim_matches('/'));

    if request_path
        .components()
        .any(|c| !matches!(c, Component::Normal(_) | Component::CurDir))
    {
        return None;
    }

    let local_path = root.join(request_path);
    if local_path.is_file() {
        return Some(local_path);
    }

    let index_path = local_path.join("index.html");
    index_path.is_file().then_some(index_path)
}

// ============================================================================
// Response Helpers
// ============================================================================

fn content_type_header(value: &str) -> Result<Header> {
    Header::from_bytes("Content-Type", value).map_err(|()| anyhow!("Invalid header value `{value}`"))
}

/// Serve a file with appropriate content type.
fn serve_file(request: Request, path: &Path) -> Result<()> {
    let content = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let header = content_type_header(guess_content_type(path))?;

    request.respond(Response::from_data(content).with_header(header))?;
    Ok(())
}

/// Serve 404 Not Found response.
fn serve_not_found(request: Request) -> Result<()> {
    let body = "404 Not Found";
    let response = Response::new(
        StatusCode(404),
        vec![content_type_header("text/plain; charset=utf-8")?],
        Cursor::new(body),
        Some(body.len()),
        None,
    );
    request.respond(response)?;
    Ok(())
}

// ============================================================================
// Content Type Detection
// ============================================================================

/// Guess MIME content type from file extension.
///
/// Returns `application/octet-stream` for unknown extensions.
fn guess_content_type(path: &Path) -> &'static str {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .map(str::to_ascii_lowercase);

    match ext.as_deref() {
        // Web content
        Some("html" | "htm") => "text/html; charset=utf-8",
        Some("css") => "text/css; charset=utf-8",
        Some("js" | "mjs") => "application/javascript; charset=utf-8",
        Some("json") => "application/json; charset=utf-8",
        Some("xml") => "application/xml; charset=utf-8",

        // Images
        Some("svg") => "image/svg+xml",
        Some("png") => "image/png",
        Some("jpg" | "jpeg") => "image/jpeg",
        Some("gif") => "image/gif",
        Some("webp") => "image/webp",
        Some("avif") => "image/avif",
        Some("ico") => "image/x-icon",

        // Fonts
        Some("woff") => "font/woff",
        Some("woff2") => "font/woff2",
        Some("ttf") => "font/ttf",
        Some("otf") => "font/otf",

        // Documents
        Some("pdf") => "application/pdf",
        Some("txt") => "text/plain; charset=utf-8",
        Some("md") => "text/markdown; charset=utf-8",

        // Default binary
        _ => "application/octet-stream",
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::{
        io::{Read, Write},
        net::{Ipv4Addr, TcpListener, TcpStream},
    };
    use tempfile::TempDir;

    fn site() -> TempDir {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(dir.path().join("assets")).unwrap();
        fs::create_dir_all(dir.path().join("guide")).unwrap();
        fs::write(dir.path().join("index.html"), "<h1>home</h1>").unwrap();
        fs::write(dir.path().join("guide/index.html"), "<h1>guide</h1>").unwrap();
        fs::write(dir.path().join("assets/my diagram.png"), b"png").unwrap();
        dir
    }

    fn get(addr: SocketAddr, path: &str) -> String {
        let mut stream = TcpStream::connect(addr).unwrap();
        write!(stream, "GET {path} HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n").unwrap();
        let mut response = String::new();
        stream.read_to_string(&mut response).unwrap();
        response
    }

    #[test]
    fn test_guess_content_type() {
        assert_eq!(guess_content_type(Path::new("a.png")), "image/png");
        assert_eq!(guess_content_type(Path::new("a.JPG")), "image/jpeg");
        assert_eq!(guess_content_type(Path::new("a.svg")), "image/svg+xml");
        assert_eq!(guess_content_type(Path::new("a.avif")), "image/avif");
        assert_eq!(guess_content_type(Path::new("index.html")), "text/html; charset=utf-8");
        assert_eq!(guess_content_type(Path::new("blob")), "application/octet-stream");
    }

    #[test]
    fn test_resolve_file_and_index() {
        let dir = site();
        let root = dir.path();

        assert_eq!(resolve_path(root, "/"), Some(root.join("index.html")));
        assert_eq!(resolve_path(root, "/guide/"), Some(root.join("guide/index.html")));
        assert_eq!(resolve_path(root, "/guide"), Some(root.join("guide/index.html")));
        assert_eq!(resolve_path(root, "/assets"), None);
    }

    #[test]
    fn test_resolve_decodes_and_strips_query() {
        let dir = site();
        let expected = Some(dir.path().join("assets/my diagram.png"));

        assert_eq!(resolve_path(dir.path(), "/assets/my%20diagram.png"), expected);
        assert_eq!(resolve_path(dir.path(), "/assets/my%20diagram.png?t=123"), expected);
    }

    #[test]
    fn test_resolve_rejects_escape() {
        let dir = site();
        let inner = dir.path().join("guide");

        assert_eq!(resolve_path(&inner, "/../index.html"), None);
        assert_eq!(resolve_path(&inner, "/%2e%2e/index.html"), None);
        assert_eq!(resolve_path(dir.path(), "/missing.png"), None);
    }

    #[test]
    fn test_try_bind_port_skips_taken_port() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let (_server, addr) = try_bind_port(IpAddr::V4(Ipv4Addr::LOCALHOST), port, MAX_PORT_RETRIES).unwrap();
        assert_ne!(addr.port(), port);
        assert!(addr.port() > port);
    }

    #[test]
    fn test_try_bind_port_exhausted() {
        let taken = TcpListener::bind((Ipv4Addr::LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();

        let Err(err) = try_bind_port(IpAddr::V4(Ipv4Addr::LOCALHOST), port, 1) else {
            panic!("bound a port that was already taken");
        };
        assert!(err.to_string().contains("Failed to bind after 1 attempts"));
    }

    #[test]
    fn test_serve_restart_and_close() {
        let dir = site();
        let (server, addr) = try_bind_port(IpAddr::V4(Ipv4Addr::LOCALHOST), 0, 1).unwrap();
        let addr = server.server_addr().to_ip().unwrap_or(addr);
        let handle = Arc::new(ServerHandle::new(server));

        let runner = {
            let handle = Arc::clone(&handle);
            let root = dir.path().to_path_buf();
            thread::spawn(move || handle.run(addr, &root))
        };

        let page = get(addr, "/");
        assert!(page.starts_with("HTTP/1.1 200"));
        assert!(page.contains("<h1>home</h1>"));
        assert!(get(addr, "/nope.png").starts_with("HTTP/1.1 404"));

        handle.restart();
        // Rebound on the same address
        let mut served = String::new();
        for _ in 0..40 {
            if let Ok(mut stream) = TcpStream::connect(addr)
                && write!(stream, "GET /assets/my%20diagram.png HTTP/1.1\r\nHost: x\r\nConnection: close\r\n\r\n").is_ok()
            {
                let _ = stream.read_to_string(&mut served);
                if served.contains("image/png") {
                    break;
                }
            }
            served.clear();
            thread::sleep(Duration::from_millis(50));
        }
        assert!(served.contains("image/png"));

        handle.close();
        runner.join().unwrap().unwrap();
        assert!(handle.is_closed());
    }

    #[test]
    fn test_restart_after_close_is_ignored() {
        let (server, _) = try_bind_port(IpAddr::V4(Ipv4Addr::LOCALHOST), 0, 1).unwrap();
        let handle = ServerHandle::new(server);
        handle.close();
        handle.restart();
        assert!(!handle.restart.load(Ordering::SeqCst));
    }
}
