//! Tileset resources.
//!
//! Tilesets are decoded off the main thread and handed over as a
//! fully-built immutable store; the only synchronization is the
//! one-shot channel at the handoff point. After that, lookups are plain
//! reads with no lock.

use std::collections::HashMap;
use std::sync::mpsc;
use std::sync::Arc;
use std::thread;

use thiserror::Error;
use tracing::info;

use crate::ground::Ground;

#[derive(Debug, Error)]
pub enum ResourceError {
    #[error("no tileset with id '{0}'")]
    UnknownTileset(String),
    #[error("failed to parse tileset '{id}': {message}")]
    Parse { id: String, message: String },
    #[error("tileset preload worker terminated without a result")]
    WorkerLost,
}

/// Immutable tileset: maps tile pattern ids to their ground
/// classification.
#[derive(Debug)]
pub struct Tileset {
    id: String,
    pattern_grounds: HashMap<u32, Ground>,
}

impl Tileset {
    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn pattern_ground(&self, pattern: u32) -> Option<Ground> {
        self.pattern_grounds.get(&pattern).copied()
    }

    pub fn pattern_count(&self) -> usize {
        self.pattern_grounds.len()
    }
}

/// Synchronous get-by-id contract. An unresolved id is a load error,
/// never a silent default.
#[derive(Debug, Default)]
pub struct TilesetStore {
    tilesets: HashMap<String, Arc<Tileset>>,
}

impl TilesetStore {
    pub fn get(&self, id: &str) -> Result<Arc<Tileset>, ResourceError> {
        self.tilesets
            .get(id)
            .cloned()
            .ok_or_else(|| ResourceError::UnknownTileset(id.to_string()))
    }

    pub fn insert(&mut self, tileset: Tileset) {
        self.tilesets
            .insert(tileset.id.clone(), Arc::new(tileset));
    }

    pub fn len(&self) -> usize {
        self.tilesets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tilesets.is_empty()
    }
}

/// Raw tileset document, as read from disk by the caller.
#[derive(Debug, Clone)]
pub struct TilesetSource {
    pub id: String,
    pub xml: String,
}

/// Handle to an in-flight background preload. `wait` blocks until the
/// worker finished and yields the immutable store.
pub struct TilesetPreload {
    receiver: mpsc::Receiver<Result<TilesetStore, ResourceError>>,
    worker: Option<thread::JoinHandle<()>>,
}

impl TilesetPreload {
    pub fn wait(mut self) -> Result<TilesetStore, ResourceError> {
        let result = self
            .receiver
            .recv()
            .map_err(|_| ResourceError::WorkerLost)?;
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
        result
    }
}

/// Decodes tilesets on a worker thread. The produced store is built
/// entirely on the worker and published once, fully constructed.
pub fn preload_tilesets(sources: Vec<TilesetSource>) -> TilesetPreload {
    let (sender, receiver) = mpsc::channel();
    let worker = thread::spawn(move || {
        let result = build_store(sources);
        // The receiver may have been dropped; nothing to do then.
        let _ = sender.send(result);
    });
    TilesetPreload {
        receiver,
        worker: Some(worker),
    }
}

/// Synchronous variant for tools and tests.
pub fn build_store(sources: Vec<TilesetSource>) -> Result<TilesetStore, ResourceError> {
    let mut store = TilesetStore::default();
    for source in sources {
        let tileset = parse_tileset(&source.id, &source.xml)?;
        info!(id = tileset.id(), patterns = tileset.pattern_count(), "tileset loaded");
        store.insert(tileset);
    }
    Ok(store)
}

fn parse_tileset(id: &str, xml: &str) -> Result<Tileset, ResourceError> {
    let parse_error = |message: String| ResourceError::Parse {
        id: id.to_string(),
        message,
    };
    let document = roxmltree::Document::parse(xml).map_err(|error| parse_error(error.to_string()))?;
    let root = document.root_element();
    if root.tag_name().name() != "tileset" {
        return Err(parse_error(format!(
            "expected root element <tileset>, found <{}>",
            root.tag_name().name()
        )));
    }
    let mut pattern_grounds = HashMap::new();
    for node in root.children().filter(roxmltree::Node::is_element) {
        if node.tag_name().name() != "pattern" {
            return Err(parse_error(format!(
                "unexpected element <{}> in tileset",
                node.tag_name().name()
            )));
        }
        let pattern_id: u32 = node
            .attribute("id")
            .ok_or_else(|| parse_error("pattern is missing the 'id' attribute".to_string()))?
            .parse()
            .map_err(|_| parse_error("pattern 'id' is not an unsigned integer".to_string()))?;
        let ground_name = node
            .attribute("ground")
            .ok_or_else(|| parse_error("pattern is missing the 'ground' attribute".to_string()))?;
        let ground = Ground::from_name(ground_name)
            .ok_or_else(|| parse_error(format!("unknown ground '{ground_name}'")))?;
        if pattern_grounds.insert(pattern_id, ground).is_some() {
            return Err(parse_error(format!("duplicate pattern id {pattern_id}")));
        }
    }
    Ok(Tileset {
        id: id.to_string(),
        pattern_grounds,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const TILESET_XML: &str = r#"
        <tileset id="overworld">
            <pattern id="1" ground="traversable"/>
            <pattern id="2" ground="wall"/>
            <pattern id="3" ground="deep_water"/>
        </tileset>
    "#;

    fn source(id: &str, xml: &str) -> TilesetSource {
        TilesetSource {
            id: id.to_string(),
            xml: xml.to_string(),
        }
    }

    #[test]
    fn preload_hands_off_a_complete_store() {
        let preload = preload_tilesets(vec![source("overworld", TILESET_XML)]);
        let store = preload.wait().expect("preload");
        let tileset = store.get("overworld").expect("tileset");
        assert_eq!(tileset.pattern_ground(2), Some(Ground::Wall));
        assert_eq!(tileset.pattern_ground(9), None);
    }

    #[test]
    fn unresolved_id_is_an_error() {
        let store = TilesetStore::default();
        assert!(matches!(
            store.get("missing"),
            Err(ResourceError::UnknownTileset(_))
        ));
    }

    #[test]
    fn malformed_tileset_fails_the_preload() {
        let preload = preload_tilesets(vec![source("broken", "<tileset><pattern/></tileset>")]);
        assert!(matches!(
            preload.wait(),
            Err(ResourceError::Parse { .. })
        ));
    }

    #[test]
    fn duplicate_pattern_id_is_rejected() {
        let xml = r#"<tileset><pattern id="1" ground="wall"/><pattern id="1" ground="hole"/></tileset>"#;
        assert!(build_store(vec![source("x", xml)]).is_err());
    }
}
