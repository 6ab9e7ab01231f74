//! Collaborator interfaces
//!
//! The engine talks to the rest of the assistant only through the traits in
//! this module: the chat transport (for out-of-band announcements), identity
//! resolution, a generative text source and a knowledge store. Every failure
//! of a collaborator is reported as a [`CollaboratorError`] and degrades to a
//! fallback at the call site; none of them can abort a round.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::{
    Announcement,
    participant::{Id, ScopeKey},
};

/// A collaborator could not fulfil a request
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CollaboratorError {
    /// The collaborator is not reachable or not configured
    #[error("collaborator unavailable: {0}")]
    Unavailable(String),
    /// The collaborator answered with something unusable
    #[error("collaborator failed: {0}")]
    Failed(String),
}

/// Sends out-of-band messages to a scope
///
/// Announcements arrive after the command that started the round has
/// already been answered, so the transport must be able to deliver to a
/// scope at any later time.
#[async_trait]
pub trait Announcer: Send + Sync {
    /// Delivers `announcement` to everyone in `scope`
    ///
    /// # Errors
    ///
    /// Returns a [`CollaboratorError`] if the message could not be delivered.
    async fn announce(
        &self,
        scope: ScopeKey,
        announcement: &Announcement,
    ) -> Result<(), CollaboratorError>;
}

/// Maps participants to human readable labels
#[async_trait]
pub trait IdentityResolver: Send + Sync {
    /// Display label of `participant`
    ///
    /// # Errors
    ///
    /// Returns a [`CollaboratorError`] if the lookup failed; callers fall
    /// back to the raw identity.
    async fn display_name(&self, participant: Id) -> Result<String, CollaboratorError>;
}

/// Free-text generation used as a trivia source
#[async_trait]
pub trait TextGenerator: Send + Sync {
    /// Generates text for `prompt`; `None` when there is nothing to say
    ///
    /// # Errors
    ///
    /// Returns a [`CollaboratorError`] if generation failed.
    async fn generate(&self, prompt: &str) -> Result<Option<String>, CollaboratorError>;
}

/// A stored fact
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KnowledgeEntry {
    /// What the fact is about; for trivia, the question
    pub key_term: String,
    /// The fact itself; for trivia, the answer key
    pub content: String,
}

/// Category keyed fact storage
#[async_trait]
pub trait KnowledgeStore: Send + Sync {
    /// A random entry of `category`, or `None` if the category is empty
    ///
    /// # Errors
    ///
    /// Returns a [`CollaboratorError`] if the store could not be queried.
    async fn random_entry(&self, category: &str)
    -> Result<Option<KnowledgeEntry>, CollaboratorError>;

    /// Files `entry` under `category`
    ///
    /// # Errors
    ///
    /// Returns a [`CollaboratorError`] if the entry could not be stored.
    async fn add_entry(
        &self,
        category: &str,
        entry: KnowledgeEntry,
    ) -> Result<(), CollaboratorError>;
}
