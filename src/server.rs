//! Wires configuration, the registry, the worker thread, and the network acceptors into
//! a single running service.

use crate::config::Settings;
use crate::net::{channel_ingress, controller};
use crate::registry::ChannelRegistry;
use crate::worker;
use crate::ServerResult;
use std::future::Future;
use std::sync::atomic::AtomicBool;
use std::sync::{Arc, Mutex};
use tokio::net::TcpListener;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;

/// A running instance of the server, built from validated [`Settings`].
pub struct Server {
    settings: Settings,
}

impl Server {
    pub fn new(settings: Settings) -> Self {
        Self { settings }
    }

    /// Binds every listener, spawns the worker thread and all acceptor/relay tasks, and
    /// runs until `shutdown` resolves. On shutdown, acceptors stop taking new
    /// connections, every connection task spawned so far is cancelled, and the worker
    /// thread is joined once its submission queue drains.
    pub async fn run(self, shutdown: impl Future<Output = ()>) -> ServerResult<()> {
        let settings = self.settings;
        let channel_amount = settings.channel_amount;

        let registry = Arc::new(ChannelRegistry::new(channel_amount));
        let (phase_shift_tx, phase_shift_rx) =
            watch::channel(Arc::new(vec![0.0; channel_amount as usize]));
        let (output_tx, output_rx) = mpsc::channel(settings.work_queue_capacity);

        let (worker_handle, work_tx) = worker::spawn(
            channel_amount,
            settings.packet_size,
            settings.carrier_threshold,
            phase_shift_rx,
            output_tx,
            settings.work_queue_capacity,
        );

        let writer = controller::spawn_relay(output_rx);
        let controller_connected = Arc::new(AtomicBool::new(false));
        let controller_listener =
            TcpListener::bind((settings.bind_address.as_str(), settings.controller_port)).await?;
        log::info!("controller listening on {}", controller_listener.local_addr()?);
        let controller_task = tokio::spawn(controller::run_acceptor(
            controller_listener,
            channel_amount,
            phase_shift_tx,
            writer,
            controller_connected,
        ));

        let connection_tasks: Arc<Mutex<Vec<JoinHandle<()>>>> = Arc::new(Mutex::new(Vec::new()));
        let mut acceptor_tasks = Vec::with_capacity(channel_amount as usize);
        for id in 0..channel_amount {
            let port = settings.channel_port(id);
            let listener = TcpListener::bind((settings.bind_address.as_str(), port)).await?;
            log::info!("channel {id} listening on {}", listener.local_addr()?);

            let registry = registry.clone();
            let work_tx = work_tx.clone();
            let max_recv = settings.max_recv;
            let connection_tasks = connection_tasks.clone();
            acceptor_tasks.push(tokio::spawn(async move {
                loop {
                    match listener.accept().await {
                        Ok((stream, addr)) => {
                            log::debug!("channel {id} accepted connection from {addr}");
                            let registry = registry.clone();
                            let work_tx = work_tx.clone();
                            let handle = tokio::spawn(channel_ingress::run(
                                id, stream, registry, work_tx, max_recv,
                            ));
                            connection_tasks
                                .lock()
                                .expect("connection task list mutex poisoned")
                                .push(handle);
                        }
                        Err(err) => log::warn!("channel {id} accept error: {err}"),
                    }
                }
            }));
        }
        // The server's own clone of the sender must be dropped too, or the worker never
        // sees its queue close even after every connection task is cancelled.
        drop(work_tx);

        shutdown.await;
        log::info!("shutdown signal received; closing acceptors");

        controller_task.abort();
        for task in acceptor_tasks {
            task.abort();
        }
        for task in connection_tasks
            .lock()
            .expect("connection task list mutex poisoned")
            .drain(..)
        {
            task.abort();
        }

        tokio::task::spawn_blocking(move || worker_handle.join())
            .await
            .expect("worker join task panicked")
            .expect("worker thread panicked");
        log::info!("worker thread joined; shutdown complete");

        Ok(())
    }
}
