//! Prefix Router (PR): a byte trie over URL prefixes, resolving each
//! request path to the longest registered prefix that is a prefix of it.
//!
//! Deliberately not the crate's generic hash map (out of scope per spec
//! §1) — each node indexes its children by byte value directly.

use crate::error::{DuplicatePrefixSnafu, RouterError};
use crate::router::handler::{Handler, HandlerArgs, ParseMask};
use snafu::OptionExt;
use std::any::Any;

/// One registered prefix → handler binding.
pub struct RouterEntry {
    pub prefix: Vec<u8>,
    pub prefix_len: usize,
    pub handler: Box<dyn Handler>,
    pub data: Box<dyn Any + Send + Sync>,
    pub flags: ParseMask,
}

struct TrieNode {
    children: Vec<Option<Box<TrieNode>>>,
    /// Index into `Router::entries` for the prefix terminating here.
    entry: Option<usize>,
}

impl TrieNode {
    fn new() -> Self {
        TrieNode {
            children: (0..256).map(|_| None).collect(),
            entry: None,
        }
    }
}

/// A user-supplied entry, prior to `init` being called.
pub struct EntrySpec {
    pub prefix: Vec<u8>,
    pub handler: Box<dyn Handler>,
    pub args: HandlerArgs,
}

pub struct Router {
    root: Box<TrieNode>,
    entries: Vec<RouterEntry>,
    torn_down: bool,
}

impl Router {
    /// Build a router from scratch, calling `handler.init(args)` for each
    /// entry in order and failing the whole build on the first error
    /// (matching the "registration walks the table" contract in spec
    /// §4.3 — nothing is torn down here since nothing was registered).
    pub fn build(specs: Vec<EntrySpec>) -> Result<Router, RouterError> {
        let mut root = Box::new(TrieNode::new());
        let mut entries = Vec::with_capacity(specs.len());

        for spec in specs {
            let data = spec.handler.init(&spec.args)?;
            let flags = spec.handler.flags();
            let index = entries.len();
            insert(&mut root, &spec.prefix, index).context(DuplicatePrefixSnafu {
                prefix: String::from_utf8_lossy(&spec.prefix).into_owned(),
            })?;
            entries.push(RouterEntry {
                prefix_len: spec.prefix.len(),
                prefix: spec.prefix,
                handler: spec.handler,
                data,
                flags,
            });
        }

        Ok(Router {
            root,
            entries,
            torn_down: false,
        })
    }

    /// Find the longest registered prefix that is a prefix of `path`.
    pub fn lookup(&self, path: &[u8]) -> Option<&RouterEntry> {
        let mut node = self.root.as_ref();
        let mut best: Option<usize> = node.entry;

        for &byte in path {
            match &node.children[byte as usize] {
                Some(next) => {
                    node = next;
                    if node.entry.is_some() {
                        best = node.entry;
                    }
                }
                None => break,
            }
        }

        best.map(|i| &self.entries[i])
    }

    /// Tear every registered entry down, in registration order. Safe to
    /// call more than once (`reconfigure` and `Drop` both call it on the
    /// same instance) — only the first call has any effect.
    pub fn teardown(&mut self) {
        if self.torn_down {
            return;
        }
        for entry in &mut self.entries {
            entry.handler.teardown(entry.data.as_mut());
        }
        self.torn_down = true;
    }

    /// Replace this router's entries with `specs`: tear down every
    /// currently-registered entry, in order, then build the replacement
    /// — `init` is not called on any `specs` entry until `teardown` has
    /// finished running on every existing one (spec §8's round-trip
    /// property).
    pub fn reconfigure(&mut self, specs: Vec<EntrySpec>) -> Result<(), RouterError> {
        self.teardown();
        *self = Router::build(specs)?;
        Ok(())
    }
}

impl Drop for Router {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn insert(root: &mut Box<TrieNode>, prefix: &[u8], index: usize) -> Option<()> {
    let mut node = root.as_mut();
    for &byte in prefix {
        node = node.children[byte as usize].get_or_insert_with(|| Box::new(TrieNode::new()));
    }
    if node.entry.is_some() {
        return None;
    }
    node.entry = Some(index);
    Some(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::http::{HttpStatus, RequestCtx, ResponseBuf};
    use std::future::Future;
    use std::pin::Pin;

    struct StubHandler;
    impl Handler for StubHandler {
        fn handle<'a>(
            &'a self,
            _ctx: &'a mut RequestCtx<'_>,
            _response: &'a mut ResponseBuf,
            _state: &'a (dyn Any + Send + Sync),
        ) -> Pin<Box<dyn Future<Output = HttpStatus> + 'a>> {
            Box::pin(async { HttpStatus::Ok })
        }
    }

    fn spec(prefix: &str) -> EntrySpec {
        EntrySpec {
            prefix: prefix.as_bytes().to_vec(),
            handler: Box::new(StubHandler),
            args: Vec::new(),
        }
    }

    #[test]
    fn longest_prefix_wins() {
        let router = Router::build(vec![spec("/a"), spec("/a/b")]).unwrap();

        assert_eq!(
            router.lookup(b"/a/b/c").unwrap().prefix,
            b"/a/b".to_vec()
        );
        assert_eq!(router.lookup(b"/a/x").unwrap().prefix, b"/a".to_vec());
        assert!(router.lookup(b"/z").is_none());
    }

    #[test]
    fn exact_match_on_registered_prefix() {
        let router = Router::build(vec![spec("/health")]).unwrap();
        assert_eq!(router.lookup(b"/health").unwrap().prefix, b"/health".to_vec());
        assert!(router.lookup(b"/healthy").unwrap().prefix == b"/health".to_vec());
    }

    #[test]
    fn duplicate_prefix_rejected() {
        let err = Router::build(vec![spec("/dup"), spec("/dup")]);
        assert!(err.is_err());
    }

    use std::sync::{Arc, Mutex};

    struct RecordingHandler {
        name: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    impl Handler for RecordingHandler {
        fn init(&self, _args: &HandlerArgs) -> Result<Box<dyn Any + Send + Sync>, RouterError> {
            self.log.lock().unwrap().push(format!("init:{}", self.name));
            Ok(Box::new(()))
        }

        fn teardown(&self, _state: &mut (dyn Any + Send + Sync)) {
            self.log.lock().unwrap().push(format!("teardown:{}", self.name));
        }

        fn handle<'a>(
            &'a self,
            _ctx: &'a mut RequestCtx<'_>,
            _response: &'a mut ResponseBuf,
            _state: &'a (dyn Any + Send + Sync),
        ) -> Pin<Box<dyn Future<Output = HttpStatus> + 'a>> {
            Box::pin(async { HttpStatus::Ok })
        }
    }

    fn recording_spec(prefix: &str, name: &'static str, log: &Arc<Mutex<Vec<String>>>) -> EntrySpec {
        EntrySpec {
            prefix: prefix.as_bytes().to_vec(),
            handler: Box::new(RecordingHandler { name, log: log.clone() }),
            args: Vec::new(),
        }
    }

    #[test]
    fn reconfigure_tears_down_every_old_entry_before_initializing_any_new_one() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let mut router = Router::build(vec![
            recording_spec("/old-a", "old-a", &log),
            recording_spec("/old-b", "old-b", &log),
        ])
        .unwrap();
        log.lock().unwrap().clear();

        router
            .reconfigure(vec![recording_spec("/new-a", "new-a", &log)])
            .unwrap();

        assert_eq!(
            *log.lock().unwrap(),
            vec!["teardown:old-a", "teardown:old-b", "init:new-a"]
        );
        assert!(router.lookup(b"/new-a").is_some());
        assert!(router.lookup(b"/old-a").is_none());
    }
}
