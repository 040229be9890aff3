//! HTTP listener supervision.
//!
//! The serve loop owns the running server. A port change binds the new port
//! first and hands the socket to the loop, which starts serving on it and
//! then shuts the old server down gracefully.

use axum::Router;
use std::io;
use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU16, Ordering};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;

/// Handle used by request handlers to inspect and move the listener
#[derive(Debug)]
pub struct ListenerControl {
    bind_ip: IpAddr,
    active_port: AtomicU16,
    rebinds: mpsc::UnboundedSender<std::net::TcpListener>,
}

/// Receiving end of [`ListenerControl::change_port`], consumed by [`serve`]
#[derive(Debug)]
pub struct Rebinds(mpsc::UnboundedReceiver<std::net::TcpListener>);

impl ListenerControl {
    pub fn new(bind_ip: IpAddr, active_port: u16) -> (Self, Rebinds) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                bind_ip,
                active_port: AtomicU16::new(active_port),
                rebinds: tx,
            },
            Rebinds(rx),
        )
    }

    pub fn active_port(&self) -> u16 {
        self.active_port.load(Ordering::SeqCst)
    }

    /// Bind `port` and switch serving to it. Returns the bound port, which
    /// differs from `port` only when `port` is 0. On error the old listener
    /// keeps serving.
    pub fn change_port(&self, port: u16) -> io::Result<u16> {
        let listener = std::net::TcpListener::bind(SocketAddr::new(self.bind_ip, port))?;
        listener.set_nonblocking(true)?;
        let bound = listener.local_addr()?.port();
        self.rebinds.send(listener).map_err(|_| {
            io::Error::new(io::ErrorKind::BrokenPipe, "listener supervisor is not running")
        })?;
        self.active_port.store(bound, Ordering::SeqCst);
        tracing::info!("Listener moved to {}:{}", self.bind_ip, bound);
        Ok(bound)
    }
}

struct RunningServer {
    handle: JoinHandle<io::Result<()>>,
    stop: oneshot::Sender<()>,
}

fn spawn_server(listener: tokio::net::TcpListener, router: Router) -> RunningServer {
    let (stop, stopped) = oneshot::channel::<()>();
    let handle = tokio::spawn(async move {
        axum::serve(listener, router.into_make_service())
            .with_graceful_shutdown(async {
                let _ = stopped.await;
            })
            .await
    });
    RunningServer { handle, stop }
}

/// Serve `router` on `listener`, moving to every listener received through
/// `rebinds`. Returns when the active server stops on its own.
pub async fn serve(
    router: Router,
    listener: tokio::net::TcpListener,
    rebinds: Rebinds,
) -> io::Result<()> {
    let Rebinds(mut rebinds) = rebinds;
    tracing::info!("Admin API listening on {}", listener.local_addr()?);
    let mut current = spawn_server(listener, router.clone());
    loop {
        tokio::select! {
            result = &mut current.handle => {
                return result.map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
            }
            next = rebinds.recv() => match next {
                Some(std_listener) => {
                    let listener = tokio::net::TcpListener::from_std(std_listener)?;
                    let previous =
                        std::mem::replace(&mut current, spawn_server(listener, router.clone()));
                    let _ = previous.stop.send(());
                    tokio::spawn(async move {
                        if let Ok(Err(e)) = previous.handle.await {
                            tracing::error!("Previous listener stopped with error: {}", e);
                        }
                    });
                }
                None => {
                    return current
                        .handle
                        .await
                        .map_err(|e| io::Error::new(io::ErrorKind::Other, e))?;
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::routing::get;
    use std::net::Ipv4Addr;
    use std::time::Duration;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};

    const LOCALHOST: IpAddr = IpAddr::V4(Ipv4Addr::LOCALHOST);

    async fn get_ok(port: u16) -> bool {
        let Ok(mut stream) = tokio::net::TcpStream::connect((LOCALHOST, port)).await else {
            return false;
        };
        let request = "GET /ping HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n";
        if stream.write_all(request.as_bytes()).await.is_err() {
            return false;
        }
        let mut response = String::new();
        let _ = stream.read_to_string(&mut response).await;
        response.starts_with("HTTP/1.1 200")
    }

    #[test]
    fn change_port_zero_reports_bound_port() {
        let (control, mut rebinds) = ListenerControl::new(LOCALHOST, 4000);
        let bound = control.change_port(0).unwrap();
        assert_ne!(bound, 0);
        assert_eq!(control.active_port(), bound);
        assert!(rebinds.0.try_recv().is_ok());
    }

    #[test]
    fn change_port_without_supervisor_fails_and_keeps_port() {
        let (control, rebinds) = ListenerControl::new(LOCALHOST, 4000);
        drop(rebinds);
        let err = control.change_port(0).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::BrokenPipe);
        assert_eq!(control.active_port(), 4000);
    }

    #[test]
    fn change_port_to_taken_port_fails() {
        let taken = std::net::TcpListener::bind((LOCALHOST, 0)).unwrap();
        let port = taken.local_addr().unwrap().port();
        let (control, _rebinds) = ListenerControl::new(LOCALHOST, 4000);
        assert!(control.change_port(port).is_err());
        assert_eq!(control.active_port(), 4000);
    }

    #[tokio::test]
    async fn serve_moves_to_new_port() {
        let router = Router::new().route("/ping", get(|| async { "pong" }));
        let listener = tokio::net::TcpListener::bind((LOCALHOST, 0)).await.unwrap();
        let first = listener.local_addr().unwrap().port();
        let (control, rebinds) = ListenerControl::new(LOCALHOST, first);
        let server = tokio::spawn(serve(router, listener, rebinds));

        assert!(get_ok(first).await);
        let second = control.change_port(0).unwrap();
        tokio::time::sleep(Duration::from_millis(100)).await;
        assert!(get_ok(second).await);
        assert!(!get_ok(first).await);

        server.abort();
    }
}
