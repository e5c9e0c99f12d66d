use std::sync::Arc;

use axum::{
    debug_handler,
    extract::{State, WebSocketUpgrade, ws::{Message, WebSocket}},
    response::Response,
};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tower_sessions::Session;

use crate::{
    AppResult, AppState,
    db::Db,
    guard::{HOME_PATH, Navigation, RouteGuard},
    pagination::{FeedKey, FeedSettings, LoadOutcome, Paginator, PinFeed},
    res,
    session::{AuthSession, SessionChange, SessionStore, Subscription},
};

use super::msg::{ClientMessage, ServerMessage};

const OUTBOX_CAPACITY: usize = 32;

/// State of one open page.
pub struct LiveView {
    db: Db,
    page_size: u32,
    session: Option<AuthSession>,
    guard: RouteGuard,
    location: Option<String>,
    feed: Option<Arc<Paginator<PinFeed>>>,
    out: mpsc::Sender<ServerMessage>,
}

impl LiveView {
    pub fn new(db: Db, settings: FeedSettings, session: Option<AuthSession>, out: mpsc::Sender<ServerMessage>) -> LiveView {
        LiveView {
            db,
            page_size: settings.page_size,
            session,
            guard: RouteGuard::new(),
            location: None,
            feed: None,
            out,
        }
    }

    pub async fn handle(&mut self, msg: ClientMessage) {
        match msg {
            ClientMessage::Mount { path, feed } => self.mount(path, feed).await,
            ClientMessage::LoadMore => self.load_more(),
        }
    }

    async fn mount(&mut self, path: String, feed: Option<FeedKey>) {
        let navigation = self.guard.resolve(self.session.as_ref(), &path);
        self.location = Some(path);
        if let Navigation::Redirect(to) = navigation {
            self.send(ServerMessage::Redirect { to }).await;
            return;
        }

        if let Some(key) = feed {
            match &self.feed {
                Some(paginator) => {
                    paginator.reset(key);
                }
                None => {
                    self.feed = Some(Arc::new(Paginator::new(PinFeed::new(self.db.clone()), key, self.page_size)));
                }
            }
            self.load_more();
        }
    }

    /// Starts fetching the next page in the background. Triggers that arrive
    /// while a page is in flight are skipped by the paginator.
    fn load_more(&self) {
        let Some(paginator) = self.feed.clone() else {
            return;
        };
        let out = self.out.clone();
        tokio::spawn(async move {
            let msg = match paginator.load_more().await {
                LoadOutcome::Loaded { items, exhausted } => ServerMessage::Items {
                    html: items.iter().map(res::pin_card).collect(),
                    exhausted,
                },
                LoadOutcome::Failed(err) => ServerMessage::failed(&err),
                LoadOutcome::Skipped | LoadOutcome::Stale => return,
            };
            // socket already gone
            let _ = out.send(msg).await;
        });
    }

    pub async fn on_session_change(&mut self, change: &SessionChange) {
        self.session = change.session.clone();
        let location = self.location.as_deref().unwrap_or(HOME_PATH);
        match self.guard.on_change(change, location) {
            Navigation::Stay => {}
            Navigation::Redirect(to) => self.send(ServerMessage::Redirect { to }).await,
            Navigation::Refresh => self.send(ServerMessage::Refresh).await,
        }
    }

    async fn send(&self, msg: ServerMessage) {
        if self.out.send(msg).await.is_err() {
            tracing::debug!("live view closed before message was sent");
        }
    }
}

#[debug_handler(state = AppState)]
pub(crate) async fn live(
    State(db): State<Db>,
    State(sessions): State<SessionStore>,
    State(settings): State<FeedSettings>,
    session: Session,

    ws: WebSocketUpgrade,
) -> AppResult<Response> {
    let client = sessions.client_key(&session).await?;
    let auth = sessions.current_session(&session).await?;

    Ok(ws.on_upgrade(async move |socket| {
        let subscription = sessions.subscribe(client);
        let (tx, rx) = mpsc::channel(OUTBOX_CAPACITY);
        run(socket, LiveView::new(db, settings, auth, tx), rx, subscription).await;
    }))
}

async fn run(
    socket: WebSocket,
    mut view: LiveView,
    mut rx: mpsc::Receiver<ServerMessage>,
    mut subscription: Subscription,
) {
    let (mut sender, mut receiver) = socket.split();

    let mut send_task = tokio::spawn(async move {
        while let Some(msg) = rx.recv().await {
            let text = match serde_json::to_string(&msg) {
                Ok(text) => text,
                Err(err) => {
                    tracing::error!(error = %err, "could not encode live message");
                    continue;
                }
            };
            if sender.send(Message::Text(text.into())).await.is_err() {
                break;
            }
        }
    });

    loop {
        tokio::select! {
            incoming = receiver.next() => match incoming {
                Some(Ok(Message::Text(text))) => match serde_json::from_str::<ClientMessage>(text.as_str()) {
                    Ok(msg) => view.handle(msg).await,
                    Err(err) => tracing::debug!(error = %err, "ignoring malformed live message"),
                },
                Some(Ok(Message::Close(_))) | Some(Err(_)) | None => break,
                Some(Ok(_)) => {}
            },
            change = subscription.recv() => match change {
                Some(change) => view.on_session_change(&change).await,
                None => break,
            },
            _ = &mut send_task => break,
        }
    }

    send_task.abort();
    tracing::debug!(location = ?view.location, "live view closed");
}

#[cfg(test)]
mod tests {
    use uuid::Uuid;

    use super::*;
    use crate::{
        db::NewPin,
        session::{AuthEvent, ClientKey},
    };

    fn auth(user_id: Uuid) -> AuthSession {
        AuthSession {
            user_id,
            access_token: "token".to_owned(),
            issued_at: 0,
            expires_at: i64::MAX,
        }
    }

    fn view(db: Db, session: Option<AuthSession>) -> (LiveView, mpsc::Receiver<ServerMessage>) {
        let (tx, rx) = mpsc::channel(8);
        (LiveView::new(db, FeedSettings { page_size: 2 }, session, tx), rx)
    }

    fn mount(path: &str, feed: Option<FeedKey>) -> ClientMessage {
        ClientMessage::Mount { path: path.to_owned(), feed }
    }

    #[tokio::test]
    async fn anonymous_mount_on_private_page_redirects() {
        let (mut view, mut rx) = view(Db::in_memory().await, None);
        view.handle(mount("/create", None)).await;
        assert_eq!(rx.recv().await, Some(ServerMessage::Redirect { to: "/login?next=%2Fcreate".to_owned() }));
    }

    #[tokio::test]
    async fn mounted_feed_streams_pages() {
        let db = Db::in_memory().await;
        let owner = db.seed_user("alice").await;
        for n in 0..3 {
            let pin = NewPin {
                image_url: Some(format!("https://img.example/{n}.jpg")),
                title: Some(format!("pin {n}")),
                width: Some(10),
                height: Some(10),
                ..Default::default()
            };
            db.create_pin(owner, pin).await.unwrap();
        }

        let (mut view, mut rx) = view(db, None);
        view.handle(mount("/", Some(FeedKey::All))).await;
        let Some(ServerMessage::Items { html, exhausted }) = rx.recv().await else {
            panic!("expected items");
        };
        assert!(!exhausted);
        assert!(html.contains("pin 2") && html.contains("pin 1"));

        view.handle(ClientMessage::LoadMore).await;
        let Some(ServerMessage::Items { html, exhausted }) = rx.recv().await else {
            panic!("expected items");
        };
        assert!(exhausted);
        assert!(html.contains("pin 0"));
    }

    #[tokio::test]
    async fn sign_out_redirects_private_views_once() {
        let user = Uuid::now_v7();
        let (mut view, mut rx) = view(Db::in_memory().await, Some(auth(user)));
        view.handle(mount("/settings/profile", None)).await;

        let signed_out = SessionChange { client: ClientKey::new(), event: AuthEvent::SignedOut, session: None };
        view.on_session_change(&signed_out).await;
        view.on_session_change(&signed_out).await;
        drop(view);

        assert_eq!(
            rx.recv().await,
            Some(ServerMessage::Redirect { to: "/login?next=%2Fsettings%2Fprofile".to_owned() })
        );
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn sign_in_refreshes_public_views() {
        let (mut view, mut rx) = view(Db::in_memory().await, None);
        view.handle(mount("/search?q=al", None)).await;

        let user = Uuid::now_v7();
        let signed_in = SessionChange { client: ClientKey::new(), event: AuthEvent::SignedIn, session: Some(auth(user)) };
        view.on_session_change(&signed_in).await;
        drop(view);

        assert_eq!(rx.recv().await, Some(ServerMessage::Refresh));
        assert_eq!(rx.recv().await, None);
    }
}
