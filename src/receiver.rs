//! Background message receiver worker (C4).

use std::sync::{Arc, Weak};
use std::thread;

use crossbeam_channel::{Receiver, Sender, unbounded};

use crate::error::{Error, Result};
use crate::message::backend::{Notification, ServerMessage};
use crate::transport::{ShutdownHandle, Transport};

const READ_CHUNK_SIZE: usize = 4096;

/// One element of the outbound queue: either a decoded message, or the single
/// terminal error a worker writes before exiting.
pub enum OutboundItem {
    Message(Box<ServerMessage>),
    Terminal(Error),
}

pub type NotificationHandler = Box<dyn Fn(Notification) + Send + 'static>;
pub type ServerMessageFilter = Box<dyn Fn(&ServerMessage) -> bool + Send + 'static>;

/// How the worker classifies decoded frames before handing them to the outbound queue.
pub enum ReceiverMode {
    /// Forward every decoded frame unfiltered; row extraction is left to a higher layer.
    DataCentric,
    /// Apply `filter` to every frame; `NotificationResponse` is always additionally
    /// delivered to `notification_handler`, run synchronously before the filter verdict.
    AllMessages {
        filter: ServerMessageFilter,
        notification_handler: Option<NotificationHandler>,
    },
}

impl ReceiverMode {
    /// `AllMessages` using the built-in default filter table and no notification handler.
    pub fn all_messages_default() -> Self {
        ReceiverMode::AllMessages {
            filter: Box::new(ServerMessage::passes_default_filter),
            notification_handler: None,
        }
    }
}

/// Identity of a running worker. Held strongly by the worker thread itself; connections
/// hold only a [`Weak`] reference so a dropped connection handle never keeps the worker
/// thread alive. Closing the connection upgrades the weak reference (if still live) and
/// shuts the transport's socket down to unblock the worker's pending read.
pub struct WorkerHandle {
    shutdown: ShutdownHandle,
}

impl WorkerHandle {
    /// Interrupt the worker by shutting down the transport socket it is blocked on.
    pub fn interrupt(&self) {
        self.shutdown.shutdown();
    }
}

/// Spawn the background worker and return a weak handle to it plus the outbound queue's
/// read side. The worker is fully constructed — its `Arc<WorkerHandle>` recorded and a
/// weak clone taken — before its receive loop starts, so an interrupt can never race
/// past a window where no handle exists yet.
pub fn spawn(mut transport: Transport, mode: ReceiverMode) -> Result<(Weak<WorkerHandle>, Receiver<OutboundItem>)> {
    let shutdown = transport.shutdown_handle()?;
    let handle = Arc::new(WorkerHandle { shutdown });
    let weak = Arc::downgrade(&handle);

    let (tx, rx) = unbounded();

    thread::spawn(move || {
        let _handle = handle;
        run(&mut transport, mode, &tx);
    });

    Ok((weak, rx))
}

fn run(transport: &mut Transport, mode: ReceiverMode, tx: &Sender<OutboundItem>) {
    if let Err(e) = pump(transport, mode, tx) {
        // A send failure here means every consumer already dropped the queue; there is
        // nothing further to do.
        let _ = tx.send(OutboundItem::Terminal(e));
    }
}

fn pump(transport: &mut Transport, mode: ReceiverMode, tx: &Sender<OutboundItem>) -> Result<()> {
    let mut buffer = Vec::new();

    loop {
        let (remaining, message) =
            crate::message::backend::decode_next_server_message(buffer, |buf| {
                transport.receive_more(buf, READ_CHUNK_SIZE)
            })?;
        buffer = remaining;
        dispatch(&mode, message, tx)?;
    }
}

fn dispatch(mode: &ReceiverMode, message: ServerMessage, tx: &Sender<OutboundItem>) -> Result<()> {
    match mode {
        ReceiverMode::DataCentric => {
            send(tx, message)?;
        }
        ReceiverMode::AllMessages { filter, notification_handler } => {
            if let ServerMessage::NotificationResponse(notification) = &message
                && let Some(handler) = notification_handler
            {
                handler(notification.clone());
            }
            if filter(&message) {
                send(tx, message)?;
            }
        }
    }
    Ok(())
}

fn send(tx: &Sender<OutboundItem>, message: ServerMessage) -> Result<()> {
    tx.send(OutboundItem::Message(Box::new(message)))
        .map_err(|_gone| Error::ReceiverException("outbound queue consumer gone".into()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::message::backend::CommandResult;
    use std::sync::Mutex;

    #[test]
    fn data_centric_forwards_everything_unfiltered() {
        let (tx, rx) = unbounded();
        let mode = ReceiverMode::DataCentric;
        dispatch(&mode, ServerMessage::BindComplete, &tx).expect("dispatch");
        dispatch(
            &mode,
            ServerMessage::CommandComplete(CommandResult::CommandOk),
            &tx,
        )
        .expect("dispatch");
        let OutboundItem::Message(first) = rx.try_recv().unwrap() else { panic!("expected message") };
        assert!(matches!(*first, ServerMessage::BindComplete));
        let OutboundItem::Message(second) = rx.try_recv().unwrap() else { panic!("expected message") };
        assert!(matches!(*second, ServerMessage::CommandComplete(_)));
    }

    #[test]
    fn all_messages_applies_default_filter() {
        let (tx, rx) = unbounded();
        let mode = ReceiverMode::all_messages_default();
        dispatch(&mode, ServerMessage::BindComplete, &tx).expect("dispatch");
        dispatch(&mode, ServerMessage::NoData, &tx).expect("dispatch");
        let OutboundItem::Message(only) = rx.try_recv().unwrap() else { panic!("expected message") };
        assert!(matches!(*only, ServerMessage::NoData));
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn notification_handler_runs_regardless_of_filter_and_nothing_enqueued() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let seen_clone = Arc::clone(&seen);
        let (tx, rx) = unbounded();
        let mode = ReceiverMode::AllMessages {
            filter: Box::new(ServerMessage::passes_default_filter),
            notification_handler: Some(Box::new(move |n| seen_clone.lock().unwrap().push(n.channel))),
        };

        let notification = Notification {
            pid: 1,
            channel: "chan".into(),
            payload: "payload".into(),
        };
        dispatch(&mode, ServerMessage::NotificationResponse(notification), &tx).expect("dispatch");

        assert_eq!(seen.lock().unwrap().as_slice(), ["chan"]);
        assert!(rx.try_recv().is_err());
    }
}
