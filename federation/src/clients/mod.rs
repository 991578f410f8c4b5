//! External collaborators consumed by the pipeline: content-addressed
//! storage, the ledger minting service, and the chat transport.
//!
//! Each collaborator is an explicitly constructed, dependency-injected
//! object behind a trait; the HTTP implementations talk to real services
//! and the in-memory implementations back tests and local runs.

mod chat;
mod ledger;
mod storage;

pub use chat::{
    ChatMessage, ChatTransport, MatrixChatClient, MemoryChat, SharedChatTransport, TransportError,
};
pub use ledger::{HttpLedgerClient, LedgerClient, MemoryLedger, MintError, SharedLedgerClient};
pub use storage::{
    Cid, ContentStore, IpfsClient, MemoryContentStore, SharedContentStore, StorageError,
};
