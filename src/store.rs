//! Replicated document store
//!
//! The hosted store is an external collaborator; `DocumentStore` lists the
//! primitives the game needs from it. `MemoryStore` implements them in
//! process, for hot-seat play and for simulating several clients in tests.
//!
//! Layout per session:
//!
//! ```text
//! sessions/<id>
//! ├── game      (single document, merge-updated)
//! ├── players   (keyed children, appended)
//! ├── rules     (keyed children, appended, counter updated)
//! └── messages  (keyed children, appended, immutable)
//! ```

use std::cell::RefCell;
use std::collections::{HashMap, VecDeque};
use std::rc::{Rc, Weak};

use thiserror::Error;

use crate::model::{Game, GameUpdate, Message, Player, PlayerId, Rule, RuleId, SessionData, SessionId};

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("session {0} does not exist")]
    SessionNotFound(SessionId),

    #[error("no child with key {0}")]
    ChildNotFound(String),

    #[error("write rejected by the store")]
    Rejected,
}

pub type Result<T> = std::result::Result<T, StoreError>;

/// Store-generated key of a child in a keyed collection
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ChildKey(pub String);

/// Something appended to one of the keyed collections
#[derive(Debug, Clone, PartialEq)]
pub enum Child {
    Player(Player),
    Rule(Rule),
    Message(Message),
}

/// A remote change, as delivered to subscribers
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    /// Whole game document value
    GameReplaced(Game),
    PlayerAdded(Player),
    PlayerChanged(Player),
    RuleAdded(Rule),
    RuleChanged(Rule),
    MessageAdded(Message),
}

impl From<Child> for Delta {
    fn from(child: Child) -> Self {
        match child {
            Child::Player(p) => Delta::PlayerAdded(p),
            Child::Rule(r) => Delta::RuleAdded(r),
            Child::Message(m) => Delta::MessageAdded(m),
        }
    }
}

type Queue = RefCell<VecDeque<Delta>>;

/// Write half of a subscription, held by the store backend
#[derive(Debug, Clone)]
pub struct DeltaSink {
    queue: Weak<Queue>,
}

impl DeltaSink {
    /// Queue a delta. Dropped once the subscription is gone.
    pub fn send(&self, delta: Delta) {
        if let Some(queue) = self.queue.upgrade() {
            queue.borrow_mut().push_back(delta);
        }
    }

    pub fn is_closed(&self) -> bool {
        self.queue.strong_count() == 0
    }
}

/// Read half of a subscription. Deltas wait here until the owner drains them.
#[derive(Debug)]
pub struct Subscription {
    queue: Rc<Queue>,
}

impl Subscription {
    /// Take everything delivered so far, in arrival order
    pub fn drain(&self) -> Vec<Delta> {
        self.queue.borrow_mut().drain(..).collect()
    }

    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }
}

/// Create a connected sink/subscription pair
pub fn subscription() -> (DeltaSink, Subscription) {
    let queue = Rc::new(RefCell::new(VecDeque::new()));
    let sink = DeltaSink {
        queue: Rc::downgrade(&queue),
    };
    (sink, Subscription { queue })
}

/// Primitives required from the backing store
///
/// Writes are field-level last-write-wins. There is no transaction or
/// conditional write.
pub trait DocumentStore {
    /// Replace the whole session document
    fn set_session(&self, session: &SessionId, data: &SessionData) -> Result<()>;

    /// Merge fields into the game document
    fn update_game(&self, session: &SessionId, update: &GameUpdate) -> Result<()>;

    /// Append a child under a generated key
    fn push(&self, session: &SessionId, child: Child) -> Result<ChildKey>;

    /// One-shot query of the rules collection by `id`
    fn find_rule(&self, session: &SessionId, id: &RuleId) -> Result<Option<(ChildKey, Rule)>>;

    fn set_times_landed(&self, session: &SessionId, key: &ChildKey, times: u32) -> Result<()>;

    /// One-shot query of the players collection by `id`
    fn find_player(&self, session: &SessionId, id: &PlayerId) -> Result<Option<(ChildKey, Player)>>;

    fn set_player_active(&self, session: &SessionId, key: &ChildKey, active: bool) -> Result<()>;

    /// Subscribe to value, child-added and child-changed events. Current
    /// contents are delivered first, as if just added.
    fn subscribe(&self, session: &SessionId) -> Result<Subscription>;
}

#[derive(Debug, Default)]
struct SessionDoc {
    game: Option<Game>,
    players: Vec<(ChildKey, Player)>,
    rules: Vec<(ChildKey, Rule)>,
    messages: Vec<(ChildKey, Message)>,
}

#[derive(Debug, Default)]
struct MemoryInner {
    sessions: HashMap<SessionId, SessionDoc>,
    sinks: HashMap<SessionId, Vec<DeltaSink>>,
    next_key: u64,
    rejecting: bool,
}

impl MemoryInner {
    fn new_key(&mut self) -> ChildKey {
        self.next_key += 1;
        ChildKey(format!("-k{:06}", self.next_key))
    }

    fn check_writable(&self) -> Result<()> {
        if self.rejecting {
            Err(StoreError::Rejected)
        } else {
            Ok(())
        }
    }

    fn doc_mut(&mut self, session: &SessionId) -> Result<&mut SessionDoc> {
        self.sessions
            .get_mut(session)
            .ok_or_else(|| StoreError::SessionNotFound(session.clone()))
    }

    fn broadcast(&mut self, session: &SessionId, delta: Delta) {
        if let Some(sinks) = self.sinks.get_mut(session) {
            sinks.retain(|sink| !sink.is_closed());
            for sink in sinks.iter() {
                sink.send(delta.clone());
            }
        }
    }
}

/// In-process store shared by every clone of the handle
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    inner: Rc<RefCell<MemoryInner>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent write fail (simulates a dropped connection)
    pub fn set_rejecting(&self, rejecting: bool) {
        self.inner.borrow_mut().rejecting = rejecting;
    }

    /// Current remote truth for a session
    pub fn snapshot(&self, session: &SessionId) -> Option<SessionData> {
        let inner = self.inner.borrow();
        let doc = inner.sessions.get(session)?;
        Some(SessionData {
            game: doc.game.clone()?,
            players: doc.players.iter().map(|(_, p)| p.clone()).collect(),
            rules: doc.rules.iter().map(|(_, r)| r.clone()).collect(),
            messages: doc.messages.iter().map(|(_, m)| m.clone()).collect(),
        })
    }
}

impl DocumentStore for MemoryStore {
    fn set_session(&self, session: &SessionId, data: &SessionData) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.check_writable()?;

        let mut doc = SessionDoc {
            game: Some(data.game.clone()),
            ..Default::default()
        };
        for p in &data.players {
            let key = inner.new_key();
            doc.players.push((key, p.clone()));
        }
        for r in &data.rules {
            let key = inner.new_key();
            doc.rules.push((key, r.clone()));
        }
        for m in &data.messages {
            let key = inner.new_key();
            doc.messages.push((key, m.clone()));
        }
        inner.sessions.insert(session.clone(), doc);

        inner.broadcast(session, Delta::GameReplaced(data.game.clone()));
        for p in &data.players {
            inner.broadcast(session, Delta::PlayerAdded(p.clone()));
        }
        for r in &data.rules {
            inner.broadcast(session, Delta::RuleAdded(r.clone()));
        }
        for m in &data.messages {
            inner.broadcast(session, Delta::MessageAdded(m.clone()));
        }
        Ok(())
    }

    fn update_game(&self, session: &SessionId, update: &GameUpdate) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.check_writable()?;
        let doc = inner.doc_mut(session)?;
        let Some(game) = doc.game.as_mut() else {
            return Err(StoreError::SessionNotFound(session.clone()));
        };
        game.apply(update);
        let game = game.clone();
        inner.broadcast(session, Delta::GameReplaced(game));
        Ok(())
    }

    fn push(&self, session: &SessionId, child: Child) -> Result<ChildKey> {
        let mut inner = self.inner.borrow_mut();
        inner.check_writable()?;
        let key = inner.new_key();
        let doc = inner.doc_mut(session)?;
        match &child {
            Child::Player(p) => doc.players.push((key.clone(), p.clone())),
            Child::Rule(r) => doc.rules.push((key.clone(), r.clone())),
            Child::Message(m) => doc.messages.push((key.clone(), m.clone())),
        }
        inner.broadcast(session, child.into());
        Ok(key)
    }

    fn find_rule(&self, session: &SessionId, id: &RuleId) -> Result<Option<(ChildKey, Rule)>> {
        let inner = self.inner.borrow();
        let doc = inner
            .sessions
            .get(session)
            .ok_or_else(|| StoreError::SessionNotFound(session.clone()))?;
        Ok(doc.rules.iter().find(|(_, r)| &r.id == id).cloned())
    }

    fn set_times_landed(&self, session: &SessionId, key: &ChildKey, times: u32) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.check_writable()?;
        let doc = inner.doc_mut(session)?;
        let (_, rule) = doc
            .rules
            .iter_mut()
            .find(|(k, _)| k == key)
            .ok_or_else(|| StoreError::ChildNotFound(key.0.clone()))?;
        rule.times_landed = times;
        let rule = rule.clone();
        inner.broadcast(session, Delta::RuleChanged(rule));
        Ok(())
    }

    fn find_player(
        &self,
        session: &SessionId,
        id: &PlayerId,
    ) -> Result<Option<(ChildKey, Player)>> {
        let inner = self.inner.borrow();
        let doc = inner
            .sessions
            .get(session)
            .ok_or_else(|| StoreError::SessionNotFound(session.clone()))?;
        Ok(doc.players.iter().find(|(_, p)| &p.id == id).cloned())
    }

    fn set_player_active(&self, session: &SessionId, key: &ChildKey, active: bool) -> Result<()> {
        let mut inner = self.inner.borrow_mut();
        inner.check_writable()?;
        let doc = inner.doc_mut(session)?;
        let (_, player) = doc
            .players
            .iter_mut()
            .find(|(k, _)| k == key)
            .ok_or_else(|| StoreError::ChildNotFound(key.0.clone()))?;
        player.is_active = Some(active);
        let player = player.clone();
        inner.broadcast(session, Delta::PlayerChanged(player));
        Ok(())
    }

    fn subscribe(&self, session: &SessionId) -> Result<Subscription> {
        let mut inner = self.inner.borrow_mut();
        let (sink, sub) = subscription();

        if let Some(doc) = inner.sessions.get(session) {
            if let Some(game) = &doc.game {
                sink.send(Delta::GameReplaced(game.clone()));
            }
            for (_, p) in &doc.players {
                sink.send(Delta::PlayerAdded(p.clone()));
            }
            for (_, r) in &doc.rules {
                sink.send(Delta::RuleAdded(r.clone()));
            }
            for (_, m) in &doc.messages {
                sink.send(Delta::MessageAdded(m.clone()));
            }
        }

        inner.sinks.entry(session.clone()).or_default().push(sink);
        Ok(sub)
    }
}
