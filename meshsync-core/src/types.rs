//! Domain types shared by every meshsync crate.
//!
//! Paths inside a [`ChangeSet`] are always *relative* to the synced folder and
//! use forward slashes, so the same changeset means the same files on every
//! host regardless of where each host keeps its local copy.

use std::collections::BTreeSet;
use std::fmt;

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

// ---------------------------------------------------------------------------
// ChecksumId
// ---------------------------------------------------------------------------

/// Deterministic identifier of a remote path: lowercase hex SHA-256 of the
/// lexically normalized remote.
///
/// Every host syncing the same remote derives the same id, which is what lets
/// them share one exchange.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChecksumId(String);

impl ChecksumId {
    pub fn from_remote(remote: &str) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(normalize_remote(remote).as_bytes());
        Self(hex::encode(hasher.finalize()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Six-character prefix used to tag log lines.
    pub fn nick(&self) -> &str {
        &self.0[..6]
    }
}

impl fmt::Display for ChecksumId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.0.fmt(f)
    }
}

/// Lexical path normalization: collapses repeated separators and `.`
/// segments, resolves `..` where possible, keeps a leading and a trailing
/// separator. An empty result becomes `.`.
pub fn normalize_remote(remote: &str) -> String {
    if remote.is_empty() {
        return ".".to_string();
    }

    let absolute = remote.starts_with('/');
    let trailing = remote.len() > 1 && remote.ends_with('/');

    let mut segments: Vec<&str> = Vec::new();
    for segment in remote.split('/') {
        match segment {
            "" | "." => {}
            ".." => match segments.last() {
                Some(&last) if last != ".." => {
                    segments.pop();
                }
                _ if absolute => {}
                _ => segments.push(".."),
            },
            other => segments.push(other),
        }
    }

    let mut normalized = segments.join("/");
    if absolute {
        normalized.insert(0, '/');
    }
    if normalized.is_empty() {
        return ".".to_string();
    }
    if trailing && !normalized.ends_with('/') {
        normalized.push('/');
    }
    normalized
}

/// Normalize a folder-relative path: forward slashes, no leading `./` or
/// `/`, no empty or `.` segments.
pub fn normalize_relative(path: &str) -> String {
    path.replace('\\', "/")
        .split('/')
        .filter(|segment| !segment.is_empty() && *segment != ".")
        .collect::<Vec<_>>()
        .join("/")
}

// ---------------------------------------------------------------------------
// ChangeKind / ChangeSet
// ---------------------------------------------------------------------------

/// The three kinds of change tracked in a changeset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChangeKind {
    Create,
    Modify,
    Remove,
}

impl ChangeKind {
    pub const ALL: [ChangeKind; 3] = [ChangeKind::Create, ChangeKind::Modify, ChangeKind::Remove];
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::Create => write!(f, "create"),
            ChangeKind::Modify => write!(f, "modify"),
            ChangeKind::Remove => write!(f, "remove"),
        }
    }
}

/// Created / modified / removed relative paths produced by one sync run.
///
/// Decoding normalizes every path the same way [`ChangeSet::insert`] does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "WireChangeSet")]
pub struct ChangeSet {
    #[serde(default)]
    pub create: BTreeSet<String>,
    #[serde(default)]
    pub modify: BTreeSet<String>,
    #[serde(default)]
    pub remove: BTreeSet<String>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `path` under `kind`. The path is normalized first; empty paths
    /// are ignored.
    pub fn insert(&mut self, kind: ChangeKind, path: &str) {
        let path = normalize_relative(path);
        if path.is_empty() {
            return;
        }
        self.paths_mut(kind).insert(path);
    }

    pub fn contains(&self, kind: ChangeKind, path: &str) -> bool {
        self.paths(kind).contains(path)
    }

    pub fn paths(&self, kind: ChangeKind) -> &BTreeSet<String> {
        match kind {
            ChangeKind::Create => &self.create,
            ChangeKind::Modify => &self.modify,
            ChangeKind::Remove => &self.remove,
        }
    }

    fn paths_mut(&mut self, kind: ChangeKind) -> &mut BTreeSet<String> {
        match kind {
            ChangeKind::Create => &mut self.create,
            ChangeKind::Modify => &mut self.modify,
            ChangeKind::Remove => &mut self.remove,
        }
    }

    /// Every `(kind, path)` pair, kinds in `create, modify, remove` order.
    pub fn entries(&self) -> impl Iterator<Item = (ChangeKind, &str)> + '_ {
        ChangeKind::ALL
            .into_iter()
            .flat_map(move |kind| self.paths(kind).iter().map(move |p| (kind, p.as_str())))
    }

    pub fn len(&self) -> usize {
        self.create.len() + self.modify.len() + self.remove.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// A changeset as it arrives from a peer, before normalization.
#[derive(Deserialize)]
struct WireChangeSet {
    #[serde(default)]
    create: Vec<String>,
    #[serde(default)]
    modify: Vec<String>,
    #[serde(default)]
    remove: Vec<String>,
}

impl From<WireChangeSet> for ChangeSet {
    fn from(wire: WireChangeSet) -> Self {
        let mut set = ChangeSet::new();
        for (kind, paths) in [
            (ChangeKind::Create, wire.create),
            (ChangeKind::Modify, wire.modify),
            (ChangeKind::Remove, wire.remove),
        ] {
            for path in paths {
                set.insert(kind, &path);
            }
        }
        set
    }
}

impl fmt::Display for ChangeSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "+{} ~{} -{}",
            self.create.len(),
            self.modify.len(),
            self.remove.len()
        )
    }
}

// ---------------------------------------------------------------------------
// Message
// ---------------------------------------------------------------------------

/// Wire payload announced on a folder's exchange after a sync with changes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    /// Host that ran the sync.
    pub hostname: String,
    pub changeset: ChangeSet,
}

impl Message {
    pub fn new(hostname: impl Into<String>, changeset: ChangeSet) -> Self {
        Self {
            hostname: hostname.into(),
            changeset,
        }
    }

    pub fn encode(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }

    pub fn decode(bytes: &[u8]) -> Result<Self, serde_json::Error> {
        serde_json::from_slice(bytes)
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
