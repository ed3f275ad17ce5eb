use thiserror::Error;

/// Which of the relay's three listeners an error belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerRole {
    Udp,
    WebSocket,
    Http,
}

impl ServerRole {
    pub fn env_var(self) -> &'static str {
        match self {
            ServerRole::Udp => "UDP_PORT",
            ServerRole::WebSocket => "WS_PORT",
            ServerRole::Http => "HTTP_PORT",
        }
    }
}

impl std::fmt::Display for ServerRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ServerRole::Udp => "UDP telemetry",
            ServerRole::WebSocket => "WebSocket",
            ServerRole::Http => "HTTP diagnostics",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum RelayError {
    /// Fatal at startup: the process reports it and exits non-zero.
    #[error("could not bind {role} listener on {addr}: {source} (is the port in use? set HOST/{} to change it)", .role.env_var())]
    Bind {
        role: ServerRole,
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{role} server failed: {source}")]
    Serve {
        role: ServerRole,
        #[source]
        source: std::io::Error,
    },

    #[error("could not install signal handler: {0}")]
    Signal(#[source] std::io::Error),
}

pub type Result<T> = std::result::Result<T, RelayError>;
