use std::collections::HashMap;
use std::net::SocketAddr;
use std::pin::pin;
use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures::StreamExt;
use serde::Serialize;
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt, ReadHalf, WriteHalf};
use tokio::select;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use super::envelope::{CallEnvelope, Method, ResponseFrame, next_line};
use super::messages::CancelRequest;
use super::service::NodeService;
use crate::errors::{ErrorResponse, GatewayError};
use crate::feed::wait_terminated;
use crate::translator::NodeClient;

// -----------------------------------------------------------------------------
// ----- Constants -------------------------------------------------------------

const SCRATCH_CAPACITY_HINT: usize = 4096;

/// Frames queued for the writer. A full outbox parks the producing call, so a
/// client that stops reading stops pulling events off its subscriptions.
const OUTBOX_CAPACITY: usize = 64;

// -----------------------------------------------------------------------------
// ----- FrontendConnection ----------------------------------------------------

/// One client connection. Calls run as their own tasks so a slow node answer
/// or a long stream never blocks the next line; every task still running when
/// the client goes away is aborted.
pub struct FrontendConnection<S, C> {
    peer: SocketAddr,
    service: Arc<NodeService<C>>,

    inbox: BytesMut,
    reader: ReadHalf<S>,
    async_writer: mpsc::Sender<Bytes>,

    calls: HashMap<u64, JoinHandle<()>>,
}

// -----------------------------------------------------------------------------
// ----- FrontendConnection: Static --------------------------------------------

impl<S, C> FrontendConnection<S, C>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    C: NodeClient,
{
    pub fn new(stream: S, peer: SocketAddr, service: Arc<NodeService<C>>) -> Self {
        let (reader, writer) = tokio::io::split(stream);

        let (writer_tx, writer_rx) = mpsc::channel::<Bytes>(OUTBOX_CAPACITY);
        spawn_writer_task(writer, writer_rx);

        Self {
            peer,
            service,
            inbox: BytesMut::with_capacity(SCRATCH_CAPACITY_HINT),
            reader,
            async_writer: writer_tx,
            calls: HashMap::new(),
        }
    }
}

// -----------------------------------------------------------------------------
// ----- FrontendConnection: Public --------------------------------------------

impl<S, C> FrontendConnection<S, C>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    C: NodeClient,
{
    pub async fn serve(mut self) -> std::io::Result<()> {
        loop {
            select! {

                // -- Client calls --
                read_res = async {
                    self.inbox.reserve(SCRATCH_CAPACITY_HINT);
                    self.reader.read_buf(&mut self.inbox).await
                } => {
                    let n = read_res?;
                    if n == 0 { break; }

                    self.calls.retain(|_, task| !task.is_finished());

                    loop {
                        match next_line(&mut self.inbox) {
                            Ok(Some(line)) => self.process_line(&line).await,
                            Ok(None) => break,
                            Err(violation) => {
                                warn!("dropping client {}: {}", self.peer, violation.message);
                                self.reply(ResponseFrame::failure(None, violation)).await;
                                return Ok(());
                            }
                        }
                    }
                }
            }
        }

        debug!("client {} disconnected", self.peer);
        Ok(())
    }
}

// -----------------------------------------------------------------------------
// ----- FrontendConnection: Private -------------------------------------------

impl<S, C> FrontendConnection<S, C>
where
    S: AsyncRead + AsyncWrite + Send + 'static,
    C: NodeClient,
{
    async fn process_line(&mut self, line: &[u8]) {
        let call: CallEnvelope = match serde_json::from_slice(line) {
            Ok(call) => call,
            Err(e) => {
                let violation = ErrorResponse::protocol_violation(format!("malformed call: {e}"));
                self.reply(ResponseFrame::failure(None, violation)).await;
                return;
            }
        };

        let id = call.id;
        let method = match call.method.parse::<Method>() {
            Ok(method) => method,
            Err(err) => {
                self.reply(ResponseFrame::error(Some(id), &err)).await;
                return;
            }
        };

        if let Err(err) = self.service.auth().check(call.token().as_ref()) {
            self.reply(ResponseFrame::error(Some(id), &err)).await;
            return;
        }

        trace!("client {} call {id} {}", self.peer, method.as_str());

        if method == Method::Cancel {
            self.cancel(&call).await;
            return;
        }

        if self.calls.get(&id).is_some_and(|task| !task.is_finished()) {
            let err = GatewayError::InvalidArgument(format!("call id {id} is already in flight"));
            self.reply(ResponseFrame::error(Some(id), &err)).await;
            return;
        }

        let task = tokio::spawn(run_call(
            self.service.clone(),
            method,
            call,
            self.async_writer.clone(),
        ));
        self.calls.insert(id, task);
    }

    async fn cancel(&mut self, call: &CallEnvelope) {
        let request: CancelRequest = match call.params() {
            Ok(request) => request,
            Err(err) => {
                self.reply(ResponseFrame::error(Some(call.id), &err)).await;
                return;
            }
        };

        let cancelled = match self.calls.remove(&request.id) {
            Some(task) if !task.is_finished() => {
                task.abort();
                self.reply(ResponseFrame::done(request.id)).await;
                true
            }
            _ => false,
        };

        self.reply(ResponseFrame::result(call.id, &CancelReply { cancelled }))
            .await;
    }

    async fn reply(&self, frame: ResponseFrame) {
        // The writer only goes away with the socket; the read side notices.
        let _ = self.async_writer.send(frame.to_line()).await;
    }
}

impl<S, C> Drop for FrontendConnection<S, C> {
    fn drop(&mut self) {
        for (_, task) in self.calls.drain() {
            task.abort();
        }
    }
}

#[derive(Serialize)]
struct CancelReply {
    cancelled: bool,
}

// -----------------------------------------------------------------------------
// ----- Internal: Calls -------------------------------------------------------

async fn run_call<C: NodeClient>(
    service: Arc<NodeService<C>>,
    method: Method,
    call: CallEnvelope,
    outbox: mpsc::Sender<Bytes>,
) {
    let id = call.id;

    if let Err(err) = dispatch(&service, method, &call, &outbox).await {
        debug!("call {id} {} failed: {err}", method.as_str());
        let _ = outbox.send(ResponseFrame::error(Some(id), &err).to_line()).await;
    }
}

/// Run the call to completion. Stream calls end with `done`; a closed outbox
/// means the client is gone and ends the call quietly.
async fn dispatch<C: NodeClient>(
    service: &NodeService<C>,
    method: Method,
    call: &CallEnvelope,
    outbox: &mpsc::Sender<Bytes>,
) -> Result<(), GatewayError> {
    let id = call.id;

    let frame = match method {
        Method::AccountBalance => {
            ResponseFrame::result(id, &service.account_balance(&call.params()?).await?)
        }
        Method::AccountsBalances => {
            ResponseFrame::result(id, &service.accounts_balances(&call.params()?).await?)
        }
        Method::BlockInfo => ResponseFrame::result(id, &service.block_info(&call.params()?).await?),
        Method::AccountCreate => {
            ResponseFrame::result(id, &service.account_create(&call.params()?).await?)
        }
        Method::ValidateAccountNumber => ResponseFrame::result(
            id,
            &service.validate_account_number(&call.params()?).await?,
        ),
        Method::Send => ResponseFrame::result(id, &service.send(&call.params()?).await?),

        Method::BlocksInfo => {
            let mut entries = pin!(service.blocks_info(call.params()?));
            while let Some(entry) = entries.next().await {
                if outbox.send(ResponseFrame::item(id, &entry?).to_line()).await.is_err() {
                    return Ok(());
                }
            }
            ResponseFrame::done(id)
        }

        Method::Subscribe => {
            let mut subscriber = service.subscribe(&call.params()?)?;
            let status = service.feed_status();

            // Events only reach this call while it is parked in `recv`. Waiting
            // on a full outbox means missing them, never queueing them.
            loop {
                select! {
                    event = subscriber.recv() => {
                        let Some(event) = event else { break };
                        let frame = ResponseFrame::item(id, &*event).to_line();
                        if outbox.send(frame).await.is_err() {
                            return Ok(());
                        }
                    }
                    terminal = wait_terminated(status.clone()) => {
                        terminal?;
                        break;
                    }
                }
            }
            ResponseFrame::done(id)
        }

        Method::Cancel => {
            return Err(GatewayError::InvalidArgument(
                "cancel is handled by the connection".to_string(),
            ));
        }
    };

    let _ = outbox.send(frame.to_line()).await;
    Ok(())
}

// -----------------------------------------------------------------------------
// ----- Internal: Helpers -----------------------------------------------------

fn spawn_writer_task<S>(mut writer: WriteHalf<S>, mut rx: mpsc::Receiver<Bytes>)
where
    S: AsyncWrite + Send + 'static,
{
    tokio::spawn(async move {
        while let Some(mut buf) = rx.recv().await {
            if writer.write_all_buf(&mut buf).await.is_err() {
                break;
            }

            // coalesce bursts to cut syscalls
            while let Ok(mut more) = rx.try_recv() {
                if writer.write_all_buf(&mut more).await.is_err() {
                    return;
                }
            }

            if writer.flush().await.is_err() {
                break;
            }
        }

        let _ = writer.shutdown().await;
    });
}

// -----------------------------------------------------------------------------
// ----- Tests -----------------------------------------------------------------


// -----------------------------------------------------------------------------
// -----------------------------------------------------------------------------
