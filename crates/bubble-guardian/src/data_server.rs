//! `DataServer` — the physical byte/metadata store the Guardian dispatches
//! to once a request is authorized. This module is the full contract for
//! implementers of a backing store: the trait, its per-method option
//! structs, and the error taxonomy the Guardian passes through verbatim.

use alloy_primitives::Address;
use async_trait::async_trait;
use bubble_types::rpc::error::GuardianErrorCode;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Errors a [`DataServer`] implementation may report. Each variant carries
/// the `GuardianErrorCode` it maps to 1:1 — the Guardian passes storage
/// errors through verbatim. An error the DataServer raises without a recognized code is
/// wrapped as [`DataServerError::Internal`] by the Guardian, never left
/// uncoded on the wire.
#[derive(Debug, thiserror::Error)]
pub enum DataServerError {
    #[error("bubble already exists")]
    BubbleAlreadyExists,
    #[error("bubble does not exist")]
    BubbleDoesNotExist,
    #[error("file does not exist")]
    FileDoesNotExist,
    #[error("directory already exists")]
    DirectoryAlreadyExists,
    #[error("invalid option: {0}")]
    InvalidOption(String),
    #[error("internal server error: {0}")]
    Internal(String),
}

impl DataServerError {
    pub fn code(&self) -> GuardianErrorCode {
        match self {
            DataServerError::BubbleAlreadyExists => GuardianErrorCode::BubbleAlreadyExists,
            DataServerError::BubbleDoesNotExist => GuardianErrorCode::BubbleDoesNotExist,
            DataServerError::FileDoesNotExist => GuardianErrorCode::FileDoesNotExist,
            DataServerError::DirectoryAlreadyExists => GuardianErrorCode::DirectoryAlreadyExists,
            DataServerError::InvalidOption(_) => GuardianErrorCode::InvalidOption,
            DataServerError::Internal(_) => GuardianErrorCode::InternalServerError,
        }
    }
}

/// The type of a directory entry returned by [`DataServer::list`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntryKind {
    File,
    Directory,
}

/// One entry in a [`DataServer::list`] result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: EntryKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub length: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub modified: Option<i64>,
}

/// `{silent: bool}`, shared by `create`, `read`, `delete`, `mkdir`,
/// `terminate`, `list`.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SilentOption {
    #[serde(default)]
    pub silent: bool,
}

/// `delete`'s options: `silent` plus `force`, required by policy for
/// non-empty directory removal if an implementation chooses to enforce it.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DeleteOptions {
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub force: bool,
}

/// `list`'s options.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListOptions {
    #[serde(default)]
    pub silent: bool,
    #[serde(default)]
    pub long: bool,
    #[serde(default)]
    pub length: bool,
    #[serde(default)]
    pub created: bool,
    #[serde(default)]
    pub modified: bool,
    #[serde(default)]
    pub directory_only: bool,
    #[serde(default)]
    pub matches: Option<String>,
    #[serde(default)]
    pub after: Option<i64>,
    #[serde(default)]
    pub before: Option<i64>,
    #[serde(default)]
    pub created_after: Option<i64>,
    #[serde(default)]
    pub created_before: Option<i64>,
}

/// `subscribe`'s options: whether the initial snapshot includes a directory
/// listing and/or the file's current content.
#[derive(Debug, Clone, Copy, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeOptions {
    #[serde(default)]
    pub list: bool,
    #[serde(default)]
    pub read: bool,
}

/// The initial snapshot [`DataServer::subscribe`] returns.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubscribeResult {
    pub subscription_id: String,
    pub file: ListEntry,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub list: Option<Vec<ListEntry>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<String>,
}

fn parse_options<T: serde::de::DeserializeOwned + Default>(
    raw: Option<&Value>,
) -> Result<T, DataServerError> {
    match raw {
        None => Ok(T::default()),
        Some(value) => serde_json::from_value(value.clone())
            .map_err(|e| DataServerError::InvalidOption(e.to_string())),
    }
}

/// Parses `create`/`read`/`delete(silent-only view)`/`mkdir`/`terminate`'s
/// shared `{silent}` shape out of a request's raw options object.
pub fn parse_silent_option(raw: Option<&Value>) -> Result<SilentOption, DataServerError> {
    parse_options(raw)
}

/// Parses `delete`'s `{silent, force}` options.
pub fn parse_delete_options(raw: Option<&Value>) -> Result<DeleteOptions, DataServerError> {
    parse_options(raw)
}

/// Parses `list`'s options, including compiling `matches` as a regex eagerly
/// so an invalid pattern fails fast as `INVALID_OPTION` rather than at scan
/// time.
pub fn parse_list_options(raw: Option<&Value>) -> Result<ListOptions, DataServerError> {
    let options: ListOptions = parse_options(raw)?;
    if let Some(pattern) = &options.matches {
        regex::Regex::new(pattern).map_err(|e| DataServerError::InvalidOption(e.to_string()))?;
    }
    Ok(options)
}

/// Parses `subscribe`'s `{list, read}` options.
pub fn parse_subscribe_options(raw: Option<&Value>) -> Result<SubscribeOptions, DataServerError> {
    parse_options(raw)
}

/// The physical backing store a Guardian dispatches authorized requests to.
///
/// Every method here is called only after the Guardian's authorization
/// algorithm has already authorized the request; a `DataServer`
/// implementation never re-checks permissions. `path` is always the full
/// path string (`<hash>` or `<hash>/<name>`) the request named, already
/// validated against the path grammar.
#[async_trait]
pub trait DataServer: Send + Sync {
    /// Creates the bubble (the root directory) for `contract`. Idempotent
    /// under `{silent: true}`.
    async fn create(&self, contract: Address, options: SilentOption) -> Result<(), DataServerError>;

    /// Overwrites `path`'s content with `data`, creating the parent
    /// directory if necessary. Never silenced: a missing bubble is always
    /// `BUBBLE_DOES_NOT_EXIST`.
    async fn write(&self, contract: Address, path: &str, data: &str) -> Result<(), DataServerError>;

    /// Extends (or creates) `path` with `data` appended, creating the
    /// parent directory if necessary. Never silenced.
    async fn append(&self, contract: Address, path: &str, data: &str) -> Result<(), DataServerError>;

    /// Reads `path`'s content. Reading a directory behaves as `list`.
    async fn read(&self, contract: Address, path: &str, options: SilentOption) -> Result<String, DataServerError>;

    /// Removes `path` (file or directory; directory removal cascades).
    /// Never removes the bubble root — use `terminate` for that.
    async fn delete(&self, contract: Address, path: &str, options: DeleteOptions) -> Result<(), DataServerError>;

    /// Creates directory `path`. Never the root.
    async fn mkdir(&self, contract: Address, path: &str, options: SilentOption) -> Result<(), DataServerError>;

    /// Lists `path`'s directory entries, or lists the whole bubble if `path`
    /// is the root.
    async fn list(&self, contract: Address, path: &str, options: ListOptions) -> Result<Vec<ListEntry>, DataServerError>;

    /// Opens a long-lived subscription on `path`, returning an initial
    /// snapshot. Fan-out of subsequent notifications is the Guardian's
    /// [`crate::subscription::SubscriptionManager`]'s job, not this trait's;
    /// a `DataServer` implementation calls back into that manager's
    /// `publish` whenever it mutates a subscribed path.
    async fn subscribe(
        &self,
        contract: Address,
        path: &str,
        subscription_id: &str,
        options: SubscribeOptions,
    ) -> Result<SubscribeResult, DataServerError>;

    /// Removes a subscription. Succeeds even if `subscription_id` is
    /// unknown (idempotent).
    async fn unsubscribe(&self, subscription_id: &str) -> Result<(), DataServerError>;

    /// Removes the bubble entirely. `BUBBLE_DOES_NOT_EXIST` unless silenced.
    async fn terminate(&self, contract: Address, options: SilentOption) -> Result<(), DataServerError>;
}
