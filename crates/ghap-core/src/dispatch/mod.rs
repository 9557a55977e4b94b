//! Tool Dispatcher (§4.M): the single boundary between the outside world
//! (RPC, hooks) and every service built on top of the metadata/vector
//! stores. Every tool is registered under a fixed name in [`TOOL_NAMES`];
//! [`Dispatcher::dispatch`] never lets a panic or a raw `Result::Err`
//! escape — everything is funneled into the response envelope.
//!
//! Legacy tool names (`start_session`, `get_orphaned_ghap`,
//! `should_check_in`, `increment_tool_count`, `reset_tool_count`) are
//! deliberately absent: their function is now split between the Hook
//! Contract (`hooks/`) and the Counter Bus (`counter/`, `session/`).

use std::path::PathBuf;
use std::sync::Arc;

use serde::Serialize;
use serde_json::{json, Value as Json};

use crate::cluster::Clusterer;
use crate::context::ContextAssembler;
use crate::counter::CounterBus;
use crate::embedding::EmbeddingService;
use crate::error::Error;
use crate::ghap::ObservationCollector;
use crate::metadata::{Lesson, MetadataStore, RootCause};
use crate::review::ReviewGateEvaluator;
use crate::search::Searcher;
use crate::task::TaskService;
use crate::values::ValueStore;
use crate::vector::VectorStore;
use crate::worktree::WorktreeManager;

/// Every name the dispatcher answers to, kept alongside `match` arms in
/// [`Dispatcher::dispatch`] the same way `enums.rs` keeps enum values
/// alongside their validators — one list, read by both the advertised
/// catalog and the live switch.
pub const TOOL_NAMES: &[&str] = &[
    "ping",
    "start_ghap",
    "update_ghap",
    "resolve_ghap",
    "get_active_ghap",
    "list_ghap_entries",
    "search_experiences",
    "search_memories",
    "search_values",
    "search_code",
    "search_commits",
    "validate_value",
    "store_value",
    "list_values",
    "create_memory",
    "get_memory",
    "list_memories",
    "delete_memory",
    "store_journal_entry",
    "list_journal_entries",
    "get_journal_entry",
    "mark_entries_reflected",
    "assemble_context",
    "create_task",
    "get_task",
    "list_tasks",
    "transition_task",
    "record_review",
    "check_reviews",
    "create_worker",
    "sweep_stale_workers",
    "get_counter",
    "increment_counter",
    "reset_counter",
    "list_counters",
    "cluster_axis",
];

/// Input schemas for the tools whose arguments are drawn from a closed
/// enum (§9). Every `enum` array here is built from `enums.rs`'s constants
/// rather than copied out by hand, so this catalog and `validate_*` can
/// never quietly drift apart — `enums::tests::schema_and_validator_enums_never_diverge`
/// pins that down.
pub fn tool_schemas() -> Json {
    use crate::enums::{
        axis_schema, confidence_tier_schema, domain_schema, outcome_status_schema,
        review_result_schema, review_type_schema, root_cause_category_schema, strategy_schema,
        task_type_schema,
    };
    json!({
        "start_ghap": {
            "type": "object",
            "properties": { "domain": domain_schema(), "strategy": strategy_schema() },
        },
        "resolve_ghap": {
            "type": "object",
            "properties": {
                "status": outcome_status_schema(),
                "confidence_tier": confidence_tier_schema(),
                "root_cause": {
                    "type": "object",
                    "properties": { "category": root_cause_category_schema() },
                },
            },
        },
        "cluster_axis": {
            "type": "object",
            "properties": { "axis": axis_schema() },
        },
        "create_task": {
            "type": "object",
            "properties": { "task_type": task_type_schema() },
        },
        "record_review": {
            "type": "object",
            "properties": { "review_type": review_type_schema(), "result": review_result_schema() },
        },
    })
}

pub fn ok_string(value: impl Into<String>) -> Json {
    json!({ "result": value.into() })
}

fn ok_object(value: impl Serialize) -> Json {
    serde_json::to_value(value).unwrap_or_else(|e| {
        json!({ "error": { "type": "internal_error", "message": e.to_string() } })
    })
}

pub fn err_envelope(error: &Error) -> Json {
    json!({ "error": { "type": error.kind(), "message": error.to_string() } })
}

fn arg_str<'a>(args: &'a Json, field: &str) -> Result<&'a str, Error> {
    args.get(field)
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::BadRequest(format!("missing or non-string field '{field}'")))
}

fn arg_str_opt<'a>(args: &'a Json, field: &str) -> Option<&'a str> {
    args.get(field).and_then(|v| v.as_str())
}

fn arg_usize(args: &Json, field: &str, default: usize) -> Result<usize, Error> {
    match args.get(field) {
        None | Some(Json::Null) => Ok(default),
        Some(v) => v
            .as_u64()
            .map(|n| n as usize)
            .ok_or_else(|| Error::BadRequest(format!("field '{field}' must be a non-negative integer"))),
    }
}

fn arg_bool(args: &Json, field: &str, default: bool) -> bool {
    args.get(field).and_then(|v| v.as_bool()).unwrap_or(default)
}

pub struct Dispatcher {
    collector: ObservationCollector,
    searcher: Arc<Searcher>,
    values: ValueStore,
    context: ContextAssembler,
    tasks: TaskService,
    worktrees: WorktreeManager,
    reviews: ReviewGateEvaluator,
    counters: CounterBus,
    metadata: MetadataStore,
    clusterer: Clusterer,
    vectors: Arc<dyn VectorStore>,
    server_name: String,
    version: String,
}

impl Dispatcher {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        metadata: MetadataStore,
        vectors: Arc<dyn VectorStore>,
        embeddings: Arc<dyn EmbeddingService>,
        server_name: impl Into<String>,
        version: impl Into<String>,
    ) -> Self {
        let server_name = server_name.into();
        let version = version.into();
        let searcher = Arc::new(Searcher::new(vectors.clone(), embeddings.clone()));
        Self {
            collector: ObservationCollector::new(metadata.clone(), vectors.clone(), embeddings.clone()),
            context: ContextAssembler::new(metadata.clone(), searcher.clone()),
            values: ValueStore::new(metadata.clone(), vectors.clone(), embeddings),
            searcher,
            tasks: TaskService::new(metadata.clone()),
            worktrees: WorktreeManager::new(metadata.clone()),
            reviews: ReviewGateEvaluator::new(metadata.clone()),
            counters: CounterBus::new(metadata.clone()),
            clusterer: Clusterer::default(),
            metadata,
            vectors,
            server_name,
            version,
        }
    }

    pub fn health(&self) -> Json {
        json!({ "status": "healthy", "server": self.server_name, "version": self.version })
    }

    /// Dispatches `tool` with `arguments`, always returning a well-formed
    /// envelope: never a raw error, never an unwind (§4.M, §5 "timeouts
    /// and cancellation" is the caller's responsibility via a deadline
    /// wrapped around this call).
    pub fn dispatch(&self, tool: &str, arguments: &Json) -> Json {
        match self.dispatch_inner(tool, arguments) {
            Ok(value) => value,
            Err(e) => err_envelope(&e),
        }
    }

    fn dispatch_inner(&self, tool: &str, args: &Json) -> Result<Json, Error> {
        match tool {
            "ping" => Ok(ok_string("pong")),

            "start_ghap" => {
                let id = self.collector.start(
                    arg_str(args, "domain")?,
                    arg_str(args, "strategy")?,
                    arg_str(args, "goal")?,
                    arg_str(args, "hypothesis")?,
                    arg_str(args, "action")?,
                    arg_str(args, "prediction")?,
                )?;
                Ok(ok_string(id))
            }
            "update_ghap" => {
                let iteration = self
                    .collector
                    .update(arg_str_opt(args, "hypothesis"), arg_str_opt(args, "prediction"))?;
                Ok(json!({ "iteration_count": iteration }))
            }
            "resolve_ghap" => {
                let root_cause = args
                    .get("root_cause")
                    .filter(|v| !v.is_null())
                    .map(|v| serde_json::from_value::<RootCause>(v.clone()))
                    .transpose()
                    .map_err(Error::from)?;
                let lesson = args
                    .get("lesson")
                    .filter(|v| !v.is_null())
                    .map(|v| serde_json::from_value::<Lesson>(v.clone()))
                    .transpose()
                    .map_err(Error::from)?;
                let id = self.collector.resolve(
                    arg_str(args, "status")?,
                    arg_str(args, "outcome_result")?,
                    arg_str_opt(args, "surprise"),
                    root_cause,
                    lesson,
                    arg_str(args, "confidence_tier")?,
                )?;
                Ok(ok_string(id))
            }
            "get_active_ghap" => match self.collector.get_active()? {
                Some(entry) => Ok(ok_object(entry)),
                None => Ok(json!({ "active": false })),
            },
            "list_ghap_entries" => {
                let limit = arg_usize(args, "limit", 20)?;
                let offset = arg_usize(args, "offset", 0)?;
                Ok(ok_object(self.collector.list_entries(limit, offset)?))
            }

            "search_experiences" => {
                let axis = arg_str_opt(args, "axis").unwrap_or("full");
                let limit = arg_usize(args, "limit", 10)?;
                Ok(ok_object(self.searcher.search_experiences(
                    arg_str(args, "query")?,
                    axis,
                    arg_str_opt(args, "domain"),
                    limit,
                )?))
            }
            "search_memories" => {
                let limit = arg_usize(args, "limit", 10)?;
                Ok(ok_object(self.searcher.search_memories(arg_str(args, "query")?, limit)?))
            }
            "search_values" => {
                let limit = arg_usize(args, "limit", 10)?;
                Ok(ok_object(self.searcher.search_values(arg_str(args, "query")?, limit)?))
            }
            "search_code" => {
                let limit = arg_usize(args, "limit", 10)?;
                Ok(ok_object(self.searcher.search_code(arg_str(args, "query")?, limit)?))
            }
            "search_commits" => {
                let limit = arg_usize(args, "limit", 10)?;
                Ok(ok_object(self.searcher.search_commits(arg_str(args, "query")?, limit)?))
            }

            "validate_value" => Ok(ok_object(
                self.values.validate(arg_str(args, "text")?, arg_str(args, "cluster_id")?)?,
            )),
            "store_value" => Ok(ok_object(self.values.store(
                arg_str(args, "text")?,
                arg_str(args, "cluster_id")?,
                arg_str(args, "axis")?,
            )?)),
            "list_values" => Ok(ok_object(self.values.list()?)),

            "create_memory" => {
                let importance = args.get("importance").and_then(|v| v.as_f64()).unwrap_or(0.5);
                Ok(ok_object(self.metadata.create_memory(
                    arg_str(args, "content")?,
                    arg_str(args, "category")?,
                    importance,
                )?))
            }
            "get_memory" => match self.metadata.get_memory(arg_str(args, "id")?)? {
                Some(memory) => Ok(ok_object(memory)),
                None => Err(Error::NotFound(format!("memory '{}' not found", arg_str(args, "id")?))),
            },
            "list_memories" => Ok(ok_object(self.metadata.list_memories()?)),
            "delete_memory" => {
                self.metadata.delete_memory(arg_str(args, "id")?)?;
                Ok(ok_string("deleted"))
            }

            "store_journal_entry" => Ok(ok_object(self.metadata.create_journal_entry(arg_str(args, "content")?)?)),
            "list_journal_entries" => {
                let include_reflected = arg_bool(args, "include_reflected", false);
                Ok(ok_object(self.metadata.list_journal_entries(include_reflected)?))
            }
            "get_journal_entry" => match self.metadata.get_journal_entry(arg_str(args, "id")?)? {
                Some(entry) => Ok(ok_object(entry)),
                None => Err(Error::NotFound(format!("journal entry '{}' not found", arg_str(args, "id")?))),
            },
            "mark_entries_reflected" => {
                let ids: Vec<String> = args
                    .get("ids")
                    .and_then(|v| v.as_array())
                    .ok_or_else(|| Error::BadRequest("missing or non-array field 'ids'".to_string()))?
                    .iter()
                    .filter_map(|v| v.as_str().map(str::to_string))
                    .collect();
                let marked = self.metadata.mark_entries_reflected(&ids)?;
                Ok(json!({ "marked": marked }))
            }

            "assemble_context" => {
                let kinds: Vec<String> = args
                    .get("kinds")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_else(|| crate::context::VALID_KINDS.iter().map(|k| k.to_string()).collect());
                let token_budget = arg_usize(args, "token_budget", 4000)?;
                let per_kind_cap = arg_usize(args, "per_kind_cap", 10)?;
                Ok(ok_object(self.context.assemble(
                    arg_str(args, "query")?,
                    &kinds,
                    token_budget,
                    per_kind_cap,
                )?))
            }

            "create_task" => {
                let blocked_by: Vec<String> = args
                    .get("blocked_by")
                    .and_then(|v| v.as_array())
                    .map(|arr| arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect())
                    .unwrap_or_default();
                Ok(ok_object(self.tasks.create_task(
                    arg_str(args, "id")?,
                    arg_str(args, "title")?,
                    arg_str(args, "task_type")?,
                    arg_str_opt(args, "spec_id"),
                    arg_str_opt(args, "specialist"),
                    arg_str_opt(args, "notes"),
                    &blocked_by,
                    arg_str_opt(args, "project_path"),
                )?))
            }
            "get_task" => match self.tasks.get_task(arg_str(args, "id")?)? {
                Some(task) => Ok(ok_object(task)),
                None => Err(Error::NotFound(format!("task '{}' not found", arg_str(args, "id")?))),
            },
            "list_tasks" => Ok(ok_object(self.tasks.list_tasks()?)),
            "transition_task" => Ok(ok_object(
                self.tasks.transition_task(arg_str(args, "id")?, arg_str(args, "to")?)?,
            )),

            "record_review" => Ok(ok_object(self.reviews.record_review(
                arg_str(args, "task_id")?,
                arg_str(args, "review_type")?,
                arg_str(args, "result")?,
                arg_str_opt(args, "worker_id"),
                arg_str_opt(args, "notes"),
            )?)),
            "check_reviews" => {
                let (satisfied, count) = self
                    .reviews
                    .check_reviews(arg_str(args, "task_id")?, arg_str(args, "review_type")?)?;
                Ok(json!({ "satisfied": satisfied, "approved_count": count }))
            }
            "create_worker" => Ok(ok_object(
                self.reviews.create_worker(arg_str(args, "task_id")?, arg_str(args, "role")?)?,
            )),
            "sweep_stale_workers" => {
                let horizon_seconds = args
                    .get("horizon_seconds")
                    .and_then(|v| v.as_i64())
                    .ok_or_else(|| Error::BadRequest("missing field 'horizon_seconds'".to_string()))?;
                let promoted = self.reviews.sweep_stale_workers(horizon_seconds)?;
                Ok(json!({ "promoted": promoted }))
            }

            "get_counter" => Ok(json!({ "value": self.counters.get(arg_str(args, "name")?)? })),
            "increment_counter" => Ok(json!({ "value": self.counters.increment(arg_str(args, "name")?)? })),
            "reset_counter" => {
                self.counters.reset(arg_str(args, "name")?)?;
                Ok(ok_string("reset"))
            }
            "list_counters" => Ok(ok_object(
                self.counters
                    .list()?
                    .into_iter()
                    .map(|(name, value)| json!({ "name": name, "value": value }))
                    .collect::<Vec<_>>(),
            )),

            "cluster_axis" => {
                let axis = arg_str(args, "axis")?;
                let report = self.clusterer.cluster_axis(self.vectors.as_ref(), axis)?;
                self.clusterer.persist_centroids(self.vectors.as_ref(), &report)?;
                Ok(ok_object(report))
            }

            _ => Err(Error::UnknownTool(tool.to_string())),
        }
    }

    /// Resolves the main repository path for worktree operations, which
    /// are exposed through a separate narrower surface than the name-keyed
    /// tool map: they need a filesystem path the JSON envelope callers
    /// rarely have reason to carry, so daemon wiring calls these directly
    /// rather than through `dispatch`.
    pub fn worktrees(&self) -> &WorktreeManager {
        &self.worktrees
    }

    pub fn detect_main_repo(&self, start: &std::path::Path) -> Result<PathBuf, Error> {
        crate::worktree::detect_main_repo(start)
    }
}
