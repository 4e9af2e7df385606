pub mod client;
pub mod protocol;

use crate::coordinator::render::Frame;
use crate::coordinator::InputResponse;
use crate::server::client::OutboundQueue;
use crate::server::protocol::{
    read_message, write_message, ClientMessage, InputEvent, MenuItem, ServerMessage,
};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use tokio::net::{UnixListener, UnixStream};
use tokio::sync::{watch, Mutex};
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Coordinator-side callbacks. The server routes; it never interprets
/// payloads beyond the envelope.
#[async_trait]
pub trait ServerHandler: Send + Sync {
    /// Map an attaching pane id to a client identity, or reject it.
    async fn resolve_identity(&self, pane_id: &str) -> Option<String>;
    async fn render_for(&self, client_id: &str, width: u16, height: u16) -> Frame;
    async fn on_input(&self, client_id: &str, event: InputEvent) -> InputResponse;
    async fn client_attached(&self, client_id: &str);
    async fn client_detached(&self, client_id: &str);
    async fn update_client_size(&self, client_id: &str, width: u16, height: u16);
    /// An input handler asked for a refresh; the scheduler coalesces it.
    async fn refresh_requested(&self);
}

struct ClientInfo {
    queue: Arc<OutboundQueue>,
    width: u16,
    height: u16,
    color_profile: Option<String>,
    last_seq: u64,
    last_activity: DateTime<Utc>,
}

struct ServerInner {
    socket_path: PathBuf,
    handler: Arc<dyn ServerHandler>,
    queue_depth: usize,
    clients: Mutex<HashMap<String, ClientInfo>>,
    /// Every spawned `serve_connection` task, so shutdown can join them.
    conn_tasks: Mutex<Vec<tokio::task::JoinHandle<()>>>,
    shutdown_tx: watch::Sender<bool>,
}

/// Owns the listen socket and one reader/writer task pair per connected
/// client. Cheap to clone; all clones share the listener and registry.
#[derive(Clone)]
pub struct Server {
    inner: Arc<ServerInner>,
}

impl Server {
    pub fn new(socket_path: PathBuf, handler: Arc<dyn ServerHandler>, queue_depth: usize) -> Self {
        let (shutdown_tx, _) = watch::channel(false);
        Self {
            inner: Arc::new(ServerInner {
                socket_path,
                handler,
                queue_depth,
                clients: Mutex::new(HashMap::new()),
                conn_tasks: Mutex::new(Vec::new()),
                shutdown_tx,
            }),
        }
    }

    pub fn socket_path(&self) -> &std::path::Path {
        &self.inner.socket_path
    }

    /// Bind the socket (replacing any stale file) and start accepting.
    pub fn start(&self) -> Result<tokio::task::JoinHandle<()>, crate::error::TabbyError> {
        let _ = std::fs::remove_file(&self.inner.socket_path);
        let listener = UnixListener::bind(&self.inner.socket_path)
            .map_err(|e| crate::error::TabbyError::Socket(e.to_string()))?;
        info!(path = %self.inner.socket_path.display(), "listening");

        let inner = self.inner.clone();
        Ok(tokio::spawn(async move {
            let mut shutdown = inner.shutdown_tx.subscribe();
            loop {
                tokio::select! {
                    accepted = listener.accept() => {
                        match accepted {
                            Ok((stream, _)) => {
                                let conn_inner = inner.clone();
                                let task = tokio::spawn(async move {
                                    serve_connection(conn_inner, stream).await;
                                });
                                inner.conn_tasks.lock().await.push(task);
                            }
                            Err(e) => {
                                warn!(error = %e, "accept failed");
                            }
                        }
                    }
                    _ = shutdown.changed() => break,
                }
            }
        }))
    }

    /// Render and enqueue a fresh frame for every connected client.
    pub async fn broadcast_render(&self) {
        let targets: Vec<(String, u16, u16, Arc<OutboundQueue>)> = {
            let clients = self.inner.clients.lock().await;
            clients
                .iter()
                .filter(|(id, _)| !id.starts_with("conn:"))
                .map(|(id, c)| (id.clone(), c.width, c.height, c.queue.clone()))
                .collect()
        };
        for (id, width, height, queue) in targets {
            let frame = self.inner.handler.render_for(&id, width, height).await;
            self.note_seq(&id, frame.seq).await;
            queue.push(ServerMessage::Render(frame));
        }
    }

    /// Animation-tick variant: only the sidebar on the active window gets
    /// a frame; hidden sidebars do not need per-frame updates.
    pub async fn render_active_window_only(&self, active_window_id: &str) {
        let target = {
            let clients = self.inner.clients.lock().await;
            clients
                .get(active_window_id)
                .map(|c| (c.width, c.height, c.queue.clone()))
        };
        if let Some((width, height, queue)) = target {
            let frame = self
                .inner
                .handler
                .render_for(active_window_id, width, height)
                .await;
            self.note_seq(active_window_id, frame.seq).await;
            queue.push(ServerMessage::Render(frame));
        }
    }

    pub async fn render_to_client(&self, client_id: &str) {
        let target = {
            let clients = self.inner.clients.lock().await;
            clients
                .get(client_id)
                .map(|c| (c.width, c.height, c.queue.clone()))
        };
        if let Some((width, height, queue)) = target {
            let frame = self.inner.handler.render_for(client_id, width, height).await;
            self.note_seq(client_id, frame.seq).await;
            queue.push(ServerMessage::Render(frame));
        }
    }

    pub async fn send_menu_to_client(&self, client_id: &str, items: Vec<MenuItem>) {
        if let Some(c) = self.inner.clients.lock().await.get(client_id) {
            c.queue.push(ServerMessage::Menu { items });
        }
    }

    pub async fn send_marker_picker_to_client(&self, client_id: &str, markers: Vec<String>) {
        if let Some(c) = self.inner.clients.lock().await.get(client_id) {
            c.queue.push(ServerMessage::MarkerPicker { markers });
        }
    }

    /// Attached client identities (provisional connections excluded).
    pub async fn client_ids(&self) -> Vec<String> {
        self.inner
            .clients
            .lock()
            .await
            .keys()
            .filter(|id| !id.starts_with("conn:"))
            .cloned()
            .collect()
    }

    pub async fn client_count(&self) -> usize {
        self.inner
            .clients
            .lock()
            .await
            .keys()
            .filter(|id| !id.starts_with("conn:"))
            .count()
    }

    pub async fn update_client_size(&self, client_id: &str, width: u16, height: u16) {
        if let Some(c) = self.inner.clients.lock().await.get_mut(client_id) {
            c.width = width;
            c.height = height;
        }
        self.inner
            .handler
            .update_client_size(client_id, width, height)
            .await;
    }

    /// Close the listener and every client connection, then wait for each
    /// per-client task to return.
    pub async fn shutdown(&self) {
        let _ = self.inner.shutdown_tx.send(true);
        {
            let clients = self.inner.clients.lock().await;
            for c in clients.values() {
                c.queue.close();
            }
        }
        // A connection accepted in the same instant as the shutdown signal
        // may land after the first drain; loop until none remain.
        loop {
            let tasks: Vec<_> = self.inner.conn_tasks.lock().await.drain(..).collect();
            if tasks.is_empty() {
                break;
            }
            for task in tasks {
                let _ = task.await;
            }
        }
        let _ = std::fs::remove_file(&self.inner.socket_path);
    }

    async fn note_seq(&self, client_id: &str, seq: u64) {
        if let Some(c) = self.inner.clients.lock().await.get_mut(client_id) {
            c.last_seq = seq;
        }
    }
}

async fn serve_connection(inner: Arc<ServerInner>, stream: UnixStream) {
    let mut shutdown_rx = inner.shutdown_tx.subscribe();
    if *shutdown_rx.borrow() {
        return;
    }
    let (mut reader, mut writer) = stream.into_split();
    let queue = Arc::new(OutboundQueue::new(inner.queue_depth));
    let mut client_id = format!("conn:{}", Uuid::new_v4());

    inner.clients.lock().await.insert(
        client_id.clone(),
        ClientInfo {
            queue: queue.clone(),
            width: 0,
            height: 0,
            color_profile: None,
            last_seq: 0,
            last_activity: Utc::now(),
        },
    );

    // Writer: drain the queue until closed.
    let writer_queue = queue.clone();
    let writer_task = tokio::spawn(async move {
        loop {
            writer_queue.ready().await;
            if writer_queue.is_closed() {
                break;
            }
            while let Some(message) = writer_queue.pop() {
                if write_message(&mut writer, &message).await.is_err() {
                    writer_queue.close();
                    break;
                }
            }
        }
    });

    // Reader: deserialise and dispatch until EOF, force-close, or server
    // shutdown.
    loop {
        let message = tokio::select! {
            m = read_message(&mut reader) => m,
            _ = queue.closed() => break,
            _ = shutdown_rx.changed() => break,
        };
        match message {
            Ok(Some(msg)) => {
                if !dispatch(&inner, &mut client_id, &queue, msg).await {
                    break;
                }
            }
            Ok(None) => break,
            Err(crate::error::TabbyError::Json(e)) => {
                // One bad payload must not kill the connection.
                warn!(client = %client_id, error = %e, "discarding malformed client message");
            }
            Err(e) => {
                warn!(client = %client_id, error = %e, "client stream error");
                break;
            }
        }
        if let Some(c) = inner.clients.lock().await.get_mut(&client_id) {
            c.last_activity = Utc::now();
        }
    }

    queue.close();
    let _ = writer_task.await;

    // A replaced duplicate shares our identity key; only deregister when
    // the registry entry is actually this connection's.
    let info = {
        let mut clients = inner.clients.lock().await;
        match clients.get(&client_id) {
            Some(c) if Arc::ptr_eq(&c.queue, &queue) => clients.remove(&client_id),
            _ => None,
        }
    };
    if let Some(info) = info {
        if !client_id.starts_with("conn:") {
            inner.handler.client_detached(&client_id).await;
            debug!(
                client = %client_id,
                last_seq = info.last_seq,
                color_profile = info.color_profile.as_deref().unwrap_or("default"),
                idle_secs = (Utc::now() - info.last_activity).num_seconds(),
                "client disconnected"
            );
        }
    }
}

/// Handle one message. Returns false when the connection should close.
async fn dispatch(
    inner: &Arc<ServerInner>,
    client_id: &mut String,
    queue: &Arc<OutboundQueue>,
    message: ClientMessage,
) -> bool {
    match message {
        ClientMessage::Attach { pane_id } => {
            let Some(identity) = inner.handler.resolve_identity(&pane_id).await else {
                warn!(pane = %pane_id, "attach from unknown pane rejected");
                return false;
            };

            let mut clients = inner.clients.lock().await;
            // One sidebar per window, one header per pane: a newer viewer
            // replaces a stale one.
            if let Some(stale) = clients.remove(&identity) {
                warn!(client = %identity, "duplicate client replaced");
                stale.queue.close();
            }
            if let Some(mut info) = clients.remove(client_id.as_str()) {
                info.last_activity = Utc::now();
                clients.insert(identity.clone(), info);
            }
            drop(clients);

            *client_id = identity.clone();
            inner.handler.client_attached(&identity).await;
            queue.push(ServerMessage::AttachedPane { pane_id });
            queue.push(ServerMessage::PtyHealth {
                mode: "streaming".into(),
                healthy: true,
            });
            true
        }
        ClientMessage::Detach { pane_id } => {
            debug!(client = %client_id, pane = %pane_id, "detach");
            false
        }
        ClientMessage::ControlResize { cols, rows, .. } => {
            if let Some(c) = inner.clients.lock().await.get_mut(client_id.as_str()) {
                c.width = cols;
                c.height = rows;
            }
            inner
                .handler
                .update_client_size(client_id, cols, rows)
                .await;
            true
        }
        ClientMessage::SidebarResize {
            width,
            height,
            color_profile,
        } => {
            if let Some(c) = inner.clients.lock().await.get_mut(client_id.as_str()) {
                c.width = width;
                c.height = height;
                c.color_profile = color_profile;
            }
            inner
                .handler
                .update_client_size(client_id, width, height)
                .await;
            // A resized viewer needs a frame at the new geometry.
            let frame = inner.handler.render_for(client_id, width, height).await;
            queue.push(ServerMessage::Render(frame));
            true
        }
        ClientMessage::Input(event) => {
            // Panic containment: a fault in the input path takes down this
            // dispatch, not the server.
            let handler = inner.handler.clone();
            let id = client_id.clone();
            let response = match tokio::spawn(async move { handler.on_input(&id, event).await })
                .await
            {
                Ok(response) => response,
                Err(join_err) => {
                    warn!(client = %client_id, error = %join_err, "input handler panicked");
                    InputResponse::None
                }
            };
            let server = Server {
                inner: inner.clone(),
            };
            match response {
                InputResponse::NeedsRefresh => inner.handler.refresh_requested().await,
                InputResponse::RedrawClient => {
                    let (width, height) = {
                        let clients = inner.clients.lock().await;
                        clients
                            .get(client_id.as_str())
                            .map(|c| (c.width, c.height))
                            .unwrap_or((0, 0))
                    };
                    let frame = inner.handler.render_for(client_id, width, height).await;
                    queue.push(ServerMessage::Render(frame));
                }
                InputResponse::ShowMenu(items) => {
                    server.send_menu_to_client(client_id, items).await;
                }
                InputResponse::ShowMarkerPicker(markers) => {
                    server.send_marker_picker_to_client(client_id, markers).await;
                }
                InputResponse::None => {}
            }
            true
        }
    }
}
