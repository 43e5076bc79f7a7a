//! Unix socket client and server for the hook command protocol.
//!
//! The client performs blocking-style calls: one frame out, wait for the matching
//! frame back, with no timeout. The server answers calls sequentially on each
//! connection and runs connections concurrently.

use super::error::RpcError;
use super::wire::{Call, Reply, JUJUC_MAIN, MAX_FRAME_LEN};
use crate::types::command::{Request, Response};
use bytes::Bytes;
use futures::{SinkExt, StreamExt};
use std::path::Path;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio_util::codec::{Framed, LengthDelimitedCodec};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

fn codec() -> LengthDelimitedCodec {
    LengthDelimitedCodec::builder()
        .max_frame_length(MAX_FRAME_LEN)
        .new_codec()
}

/// A connection to a running agent.
///
/// Dropping the client closes the socket.
pub struct Client {
    framed: Framed<UnixStream, LengthDelimitedCodec>,
    seq: u64,
}

impl Client {
    /// Connect to the agent listening at `path`
    pub async fn dial(path: impl AsRef<Path>) -> Result<Self, RpcError> {
        let path = path.as_ref();
        let stream = UnixStream::connect(path)
            .await
            .map_err(|source| RpcError::Connect {
                path: path.to_path_buf(),
                source,
            })?;
        debug!("connected to {}", path.display());
        Ok(Self {
            framed: Framed::new(stream, codec()),
            seq: 0,
        })
    }

    /// Invoke `service_method` with `req` and wait for the reply.
    pub async fn call(&mut self, service_method: &str, req: Request) -> Result<Response, RpcError> {
        self.seq += 1;
        let seq = self.seq;
        let call = Call::new(seq, service_method, req);
        self.framed.send(Bytes::from(call.to_bytes()?)).await?;

        let frame = self.framed.next().await.ok_or(RpcError::Shutdown)??;
        let reply = Reply::from_bytes(&frame)?;
        if reply.seq != seq {
            return Err(RpcError::UnexpectedReply {
                want: seq,
                got: reply.seq,
            });
        }
        reply.into_result()
    }

    /// Flush and shut down the write half of the connection
    pub async fn close(mut self) -> Result<(), RpcError> {
        // The codec encodes both `Bytes` and `&[u8]`; frames go out as `Bytes`.
        SinkExt::<Bytes>::close(&mut self.framed).await?;
        Ok(())
    }
}

/// Executes hook commands on behalf of connected tools.
///
/// Implementations run on the blocking thread pool. Returning `Err` sends the
/// message back to the tool as a call failure, distinct from a command that ran
/// and exited non-zero.
pub trait CommandRunner: Send + Sync + 'static {
    fn run(&self, req: Request) -> Result<Response, String>;
}

impl<F> CommandRunner for F
where
    F: Fn(Request) -> Result<Response, String> + Send + Sync + 'static,
{
    fn run(&self, req: Request) -> Result<Response, String> {
        self(req)
    }
}

/// Serves `Jujuc.Main` over a Unix listener
pub struct Server<R> {
    runner: Arc<R>,
}

impl<R: CommandRunner> Server<R> {
    pub fn new(runner: R) -> Self {
        Self {
            runner: Arc::new(runner),
        }
    }

    /// Accept connections until `cancel` fires.
    pub async fn serve(&self, listener: UnixListener, cancel: CancellationToken) -> Result<(), RpcError> {
        loop {
            tokio::select! {
                _ = cancel.cancelled() => {
                    info!("hook command server shutting down");
                    return Ok(());
                }
                accepted = listener.accept() => {
                    let (stream, _) = accepted?;
                    let runner = self.runner.clone();
                    let cancel = cancel.child_token();
                    tokio::spawn(async move {
                        tokio::select! {
                            _ = cancel.cancelled() => {}
                            res = serve_conn(stream, runner) => {
                                if let Err(e) = res {
                                    warn!("hook connection failed: {}", e);
                                }
                            }
                        }
                    });
                }
            }
        }
    }
}

async fn serve_conn<R: CommandRunner>(stream: UnixStream, runner: Arc<R>) -> Result<(), RpcError> {
    let mut framed = Framed::new(stream, codec());
    while let Some(frame) = framed.next().await {
        let call = Call::from_bytes(&frame?)?;
        let reply = dispatch(&runner, call).await;
        framed.send(Bytes::from(reply.to_bytes()?)).await?;
    }
    Ok(())
}

async fn dispatch<R: CommandRunner>(runner: &Arc<R>, call: Call) -> Reply {
    if call.service_method != JUJUC_MAIN {
        return Reply::error(
            &call,
            format!("rpc: can't find service {}", call.service_method),
        );
    }
    debug!(
        "running hook command {} for context {}",
        call.body.command_name, call.body.context_id
    );

    let runner = runner.clone();
    let req = call.body.clone();
    match tokio::task::spawn_blocking(move || runner.run(req)).await {
        Ok(Ok(resp)) => Reply::ok(&call, resp),
        Ok(Err(msg)) => Reply::error(&call, msg),
        Err(e) => Reply::error(&call, format!("hook command failed: {}", e)),
    }
}
