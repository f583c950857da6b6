//! Transparent Relay
//!
//! A man-in-the-middle observer that forwards raw bytes between the two
//! roles without reading into or modifying them. It holds no key material,
//! so everything it sees is either public handshake traffic or ciphertext.
//!
//! One listener per role-facing port; every accepted connection is paired
//! with a fresh outbound connection to the real peer and spliced by two
//! independent directional copy loops. Sessions share no state and run in
//! unbounded parallel.

use log::{debug, error, info};
use std::net::SocketAddr;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

const FORWARD_CHUNK: usize = 4096;

/// One forwarding rule: accept on `listen`, dial `forward`
#[derive(Debug, Clone, Copy)]
pub struct RelayRoute {
    pub listen: SocketAddr,
    pub forward: SocketAddr,
}

/// Relay proxy exposing one listener per role's peer-facing port
pub struct RelayProxy {
    initiator_route: RelayRoute,
    responder_route: RelayRoute,
}

impl RelayProxy {
    pub fn new(initiator_route: RelayRoute, responder_route: RelayRoute) -> Self {
        Self {
            initiator_route,
            responder_route,
        }
    }

    /// Run both route listeners until one fails
    pub async fn run(self) -> std::io::Result<()> {
        tokio::try_join!(
            run_route(self.initiator_route),
            run_route(self.responder_route)
        )?;
        Ok(())
    }
}

/// Bind a route's listener and serve it forever
pub async fn run_route(route: RelayRoute) -> std::io::Result<()> {
    let listener = TcpListener::bind(route.listen).await?;
    info!(
        "Relay listening on {}, forwarding to {}",
        route.listen, route.forward
    );
    serve_route(listener, route.forward).await
}

/// Accept loop for one route; each session runs in its own task
pub async fn serve_route(listener: TcpListener, forward: SocketAddr) -> std::io::Result<()> {
    loop {
        let (inbound, peer_addr) = listener.accept().await?;
        tokio::spawn(async move {
            info!("Relay session from {} to {}", peer_addr, forward);
            match TcpStream::connect(forward).await {
                Ok(outbound) => match splice(inbound, outbound).await {
                    Ok((sent, received)) => info!(
                        "Relay session {} closed ({} bytes forward, {} bytes back)",
                        peer_addr, sent, received
                    ),
                    Err(e) => error!("Relay session {} failed: {}", peer_addr, e),
                },
                Err(e) => error!("Relay could not reach {}: {}", forward, e),
            }
        });
    }
}

/// Forward bytes between two streams until both directions reach EOF.
///
/// Returns the byte counts copied in each direction. EOF in one direction
/// half-closes the other stream's write side while the opposite direction
/// keeps draining; both sockets close only once both loops finish.
pub async fn splice<A, B>(a: A, b: B) -> std::io::Result<(u64, u64)>
where
    A: AsyncRead + AsyncWrite + Unpin + Send + 'static,
    B: AsyncRead + AsyncWrite + Unpin + Send + 'static,
{
    let (read_a, write_a) = tokio::io::split(a);
    let (read_b, write_b) = tokio::io::split(b);

    let a_to_b = tokio::spawn(forward(read_a, write_b, "a->b"));
    let b_to_a = tokio::spawn(forward(read_b, write_a, "b->a"));

    let sent = join_forward(a_to_b).await?;
    let received = join_forward(b_to_a).await?;
    Ok((sent, received))
}

async fn join_forward(
    handle: tokio::task::JoinHandle<std::io::Result<u64>>,
) -> std::io::Result<u64> {
    handle
        .await
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e))?
}

/// One directional copy loop: read a chunk, write it through, repeat until
/// EOF or error, then half-close the writing side
async fn forward<R, W>(mut reader: R, mut writer: W, direction: &'static str) -> std::io::Result<u64>
where
    R: AsyncRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let result = async {
        let mut chunk = [0u8; FORWARD_CHUNK];
        let mut total = 0u64;
        loop {
            let n = reader.read(&mut chunk).await?;
            if n == 0 {
                break;
            }
            writer.write_all(&chunk[..n]).await?;
            total += n as u64;
            debug!("Relay {}: forwarded {} bytes", direction, n);
        }
        Ok(total)
    }
    .await;

    let _ = writer.shutdown().await;
    result
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_splice_forwards_both_directions() {
        let (mut side_a, relay_a) = tokio::io::duplex(256);
        let (relay_b, mut side_b) = tokio::io::duplex(256);
        let session = tokio::spawn(splice(relay_a, relay_b));

        side_a.write_all(b"hello").await.unwrap();
        let mut buf = [0u8; 5];
        side_b.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"hello");

        side_b.write_all(b"world").await.unwrap();
        side_a.read_exact(&mut buf).await.unwrap();
        assert_eq!(&buf, b"world");

        drop(side_a);
        drop(side_b);
        let (sent, received) = session.await.unwrap().unwrap();
        assert_eq!(sent, 5);
        assert_eq!(received, 5);
    }

    #[tokio::test]
    async fn test_splice_half_close_lets_other_direction_drain() {
        let (mut side_a, relay_a) = tokio::io::duplex(256);
        let (relay_b, mut side_b) = tokio::io::duplex(256);
        let session = tokio::spawn(splice(relay_a, relay_b));

        // Close the a->b direction immediately
        side_a.shutdown().await.unwrap();
        let mut buf = Vec::new();
        side_b.read_to_end(&mut buf).await.unwrap();
        assert!(buf.is_empty());

        // b->a must still be usable after the half-close
        side_b.write_all(b"late reply").await.unwrap();
        drop(side_b);
        let mut reply = Vec::new();
        side_a.read_to_end(&mut reply).await.unwrap();
        assert_eq!(reply, b"late reply");

        let (sent, received) = session.await.unwrap().unwrap();
        assert_eq!(sent, 0);
        assert_eq!(received, 10);
    }
}
