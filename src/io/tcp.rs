use std::{io, net::TcpStream};

/// Settings applied to every TCP stream the crate opens.
#[derive(Clone, Debug)]
pub struct TcpSettings {
    nodelay: bool,
    keepalive: socket2::TcpKeepalive,
}

impl TcpSettings {
    /// Sets the value of the `TCP_NODELAY` option on this socket.
    pub fn set_nodelay(self, nodelay: bool) -> Self {
        Self { nodelay, ..self }
    }

    /// Set parameters configuring TCP keepalive probes for this socket.
    pub fn set_keepalive(self, keepalive: socket2::TcpKeepalive) -> Self {
        Self { keepalive, ..self }
    }
}

impl Default for TcpSettings {
    fn default() -> Self {
        Self {
            // Request/reply traffic is latency-bound; Nagle only hurts.
            nodelay: true,
            keepalive: socket2::TcpKeepalive::new(),
        }
    }
}

pub(crate) fn stream_with_settings(
    socket: TcpStream,
    settings: &TcpSettings,
) -> io::Result<TcpStream> {
    socket.set_nodelay(settings.nodelay)?;
    let socket2: socket2::Socket = socket.into();
    socket2.set_tcp_keepalive(&settings.keepalive)?;
    Ok(socket2.into())
}

/// Applies [`TcpSettings`] to a tokio TCP stream without detaching it from
/// the runtime's reactor.
pub(crate) fn apply_settings_async(
    socket: &tokio::net::TcpStream,
    settings: &TcpSettings,
) -> io::Result<()> {
    socket.set_nodelay(settings.nodelay)?;
    let sock_ref = socket2::SockRef::from(socket);
    sock_ref.set_tcp_keepalive(&settings.keepalive)?;
    Ok(())
}
