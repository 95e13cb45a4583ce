use std::sync::Arc;

use arbor_gen::Generator;
use arbor_persist::{ConversationStore, ConversationTree};

use crate::collab::{KnowledgeResolver, SessionVerifier};
use crate::config::Config;

/// Shared application state passed to all handlers
///
/// The store, generator, and collaborator are injected as trait objects so
/// their lifecycles stay independent of any single turn and tests can
/// substitute fakes.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn ConversationStore>,
    pub tree: ConversationTree,
    pub generator: Arc<dyn Generator>,
    pub sessions: Arc<dyn SessionVerifier>,
    pub knowledge: Arc<dyn KnowledgeResolver>,
}

impl AppState {
    pub fn new(
        config: Config,
        store: Arc<dyn ConversationStore>,
        generator: Arc<dyn Generator>,
        sessions: Arc<dyn SessionVerifier>,
        knowledge: Arc<dyn KnowledgeResolver>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            tree: ConversationTree::new(store.clone()),
            store,
            generator,
            sessions,
            knowledge,
        }
    }
}
