//! The language server: LSP notifications and requests mapped onto the
//! document store and the analysis modules.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use tokio::sync::broadcast::error::RecvError;
use tokio::sync::{OnceCell, RwLock};
use tower_lsp::jsonrpc::{Error, Result};
use tower_lsp::lsp_types::*;
use tower_lsp::{Client, LanguageServer};
use tracing::{debug, info, warn};

use crate::{
    completion::get_completions,
    config::{Overrides, Settings},
    diagnostics,
    document::{DocumentStore, TextEdit},
    error::ModelError,
    gotodef::goto_definition,
    hover,
    resolver::PrefixResolver,
    syntax::Dialect,
    vocab::{CacheOptions, Fetcher, HttpFetcher, OfflineFetcher, VocabularyCache},
};

/// Everything that needs the workspace root, built once in `initialize`.
struct Services {
    settings: Settings,
    resolver: PrefixResolver,
}

/// Options a client may pass as `initializationOptions`.
#[derive(Deserialize, Debug, Default)]
#[serde(rename_all = "camelCase", default)]
struct ClientOptions {
    cache_dir: Option<PathBuf>,
    offline: bool,
}

#[derive(Clone)]
pub struct Backend {
    client: Client,
    overrides: Overrides,
    documents: Arc<RwLock<DocumentStore>>,
    services: Arc<OnceCell<Services>>,
}

impl Backend {
    pub fn new(client: Client, overrides: Overrides) -> Backend {
        Backend {
            client,
            overrides,
            documents: Arc::new(RwLock::new(DocumentStore::new())),
            services: Arc::new(OnceCell::new()),
        }
    }

    fn build_services(&self, root: PathBuf, options: ClientOptions) -> anyhow::Result<Services> {
        let overrides = Overrides {
            cache_dir: self.overrides.cache_dir.clone().or(options.cache_dir),
            offline: self.overrides.offline || options.offline,
        };
        let settings = Settings::new(&root, &overrides).unwrap_or_else(|e| {
            warn!("falling back to default settings: {e}");
            Settings {
                cache_dir: overrides
                    .cache_dir
                    .as_ref()
                    .map(|dir| dir.to_string_lossy().to_string()),
                offline: overrides.offline,
                ..Settings::default()
            }
        });
        let cache_dir = settings.resolve_cache_dir()?;

        let fetcher: Arc<dyn Fetcher> = if settings.offline {
            Arc::new(OfflineFetcher)
        } else {
            match HttpFetcher::new(Duration::from_secs(settings.fetch_timeout_secs)) {
                Ok(fetcher) => Arc::new(fetcher),
                Err(e) => {
                    warn!("no HTTP client, working offline: {e}");
                    Arc::new(OfflineFetcher)
                }
            }
        };
        let cache = VocabularyCache::new(cache_dir, fetcher, CacheOptions::from_settings(&settings));

        Ok(Services {
            resolver: PrefixResolver::new(cache),
            settings,
        })
    }

    async fn publish(&self, uri: &Url) {
        let Some(services) = self.services.get() else {
            return;
        };
        let published = {
            let documents = self.documents.read().await;
            documents.get(uri).ok().map(|document| {
                (
                    diagnostics::diagnostics(document, &services.resolver, &services.settings),
                    document.version(),
                )
            })
        };
        if let Some((diagnostics, version)) = published {
            self.client
                .publish_diagnostics(uri.clone(), diagnostics, Some(version))
                .await;
        }
    }

    async fn publish_all(&self) {
        let uris: Vec<Url> = {
            let documents = self.documents.read().await;
            documents.documents().map(|document| document.uri().clone()).collect()
        };
        for uri in uris {
            self.publish(&uri).await;
        }
    }

    /// Re-publish diagnostics whenever the cache learns something new.
    fn listen_for_cache_events(&self, services: &Services) {
        let mut events = services.resolver.cache().subscribe();
        let backend = self.clone();
        tokio::spawn(async move {
            loop {
                match events.recv().await {
                    Ok(event) => {
                        debug!(?event, "cache updated");
                        backend.publish_all().await;
                    }
                    Err(RecvError::Lagged(skipped)) => {
                        debug!(skipped, "cache events lagged");
                        backend.publish_all().await;
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
    }
}

fn workspace_root(params: &InitializeParams) -> PathBuf {
    params
        .root_uri
        .as_ref()
        .and_then(|uri| uri.to_file_path().ok())
        .or_else(|| {
            params
                .workspace_folders
                .as_ref()?
                .first()
                .and_then(|folder| folder.uri.to_file_path().ok())
        })
        .or_else(|| std::env::current_dir().ok())
        .unwrap_or_default()
}

fn dialect_for(item: &TextDocumentItem) -> Dialect {
    Dialect::from_language_id(&item.language_id)
        .or_else(|| Dialect::from_path(item.uri.path()))
        .unwrap_or(Dialect::Turtle)
}

fn to_text_edits(changes: Vec<TextDocumentContentChangeEvent>) -> Vec<TextEdit> {
    changes
        .into_iter()
        .map(|change| TextEdit {
            range: change.range,
            text: change.text,
        })
        .collect()
}

fn invalid_params(err: ModelError) -> Error {
    Error::invalid_params(err.to_string())
}

#[tower_lsp::async_trait]
impl LanguageServer for Backend {
    async fn initialize(&self, params: InitializeParams) -> Result<InitializeResult> {
        let root = workspace_root(&params);
        let options = params
            .initialization_options
            .clone()
            .map(serde_json::from_value::<ClientOptions>)
            .transpose()
            .unwrap_or_else(|e| {
                warn!("ignoring malformed initialization options: {e}");
                None
            })
            .unwrap_or_default();

        let services = self.build_services(root.clone(), options).map_err(|e| Error {
            code: tower_lsp::jsonrpc::ErrorCode::InternalError,
            message: format!("Could not set up the vocabulary cache: {e}").into(),
            data: None,
        })?;
        info!(root = %root.display(), offline = services.settings.offline, "initializing");
        if self.services.set(services).is_err() {
            warn!("initialize received twice; keeping the first configuration");
        }

        Ok(InitializeResult {
            capabilities: ServerCapabilities {
                text_document_sync: Some(TextDocumentSyncCapability::Options(
                    TextDocumentSyncOptions {
                        open_close: Some(true),
                        change: Some(TextDocumentSyncKind::INCREMENTAL),
                        save: Some(TextDocumentSyncSaveOptions::Supported(true)),
                        ..Default::default()
                    },
                )),
                completion_provider: Some(CompletionOptions {
                    trigger_characters: Some(vec![
                        ":".to_string(),
                        "@".to_string(),
                        "\"".to_string(),
                    ]),
                    resolve_provider: Some(false),
                    ..Default::default()
                }),
                hover_provider: Some(HoverProviderCapability::Simple(true)),
                definition_provider: Some(OneOf::Left(true)),
                ..Default::default()
            },
            server_info: Some(ServerInfo {
                name: "ldls".to_string(),
                version: Some(env!("CARGO_PKG_VERSION").to_string()),
            }),
        })
    }

    async fn initialized(&self, _: InitializedParams) {
        if let Some(services) = self.services.get() {
            self.listen_for_cache_events(services);
        }
        self.client
            .log_message(MessageType::INFO, "ldls initialized")
            .await;
    }

    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    async fn did_open(&self, params: DidOpenTextDocumentParams) {
        let dialect = dialect_for(&params.text_document);
        let item = params.text_document;
        let uri = item.uri.clone();
        debug!(%uri, dialect = dialect.name(), "open");

        self.documents
            .write()
            .await
            .open(item.uri, item.text, item.version, dialect);
        self.publish(&uri).await;
    }

    async fn did_change(&self, params: DidChangeTextDocumentParams) {
        let uri = params.text_document.uri;
        let version = params.text_document.version;
        let edits = to_text_edits(params.content_changes);

        let applied = self
            .documents
            .write()
            .await
            .apply_edits(&uri, version, &edits)
            .map(|_| ());
        match applied {
            Ok(()) => self.publish(&uri).await,
            Err(e) => warn!(%uri, "change ignored: {e}"),
        }
    }

    async fn did_save(&self, params: DidSaveTextDocumentParams) {
        self.publish(&params.text_document.uri).await;
    }

    async fn did_close(&self, params: DidCloseTextDocumentParams) {
        let uri = params.text_document.uri;
        if let Err(e) = self.documents.write().await.close(&uri) {
            debug!("{e}");
        }

        self.client.publish_diagnostics(uri, vec![], None).await;
    }

    async fn completion(&self, params: CompletionParams) -> Result<Option<CompletionResponse>> {
        let uri = params.text_document_position.text_document.uri;
        let position = params.text_document_position.position;
        let Some(services) = self.services.get() else {
            return Ok(None);
        };

        let documents = self.documents.read().await;
        let document = documents.get(&uri).map_err(invalid_params)?;
        Ok(get_completions(
            document,
            position,
            &services.resolver,
            &services.settings,
        ))
    }

    async fn hover(&self, params: HoverParams) -> Result<Option<Hover>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;
        let Some(services) = self.services.get() else {
            return Ok(None);
        };

        let documents = self.documents.read().await;
        let document = documents.get(&uri).map_err(invalid_params)?;
        Ok(hover::hover(
            document,
            position,
            &services.resolver,
            &services.settings,
        ))
    }

    async fn goto_definition(
        &self,
        params: GotoDefinitionParams,
    ) -> Result<Option<GotoDefinitionResponse>> {
        let uri = params.text_document_position_params.text_document.uri;
        let position = params.text_document_position_params.position;

        let documents = self.documents.read().await;
        let document = documents.get(&uri).map_err(invalid_params)?;
        Ok(goto_definition(document, position).map(GotoDefinitionResponse::Array))
    }
}
