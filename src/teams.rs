use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use troupe_agent::graph::{
    CompiledGraph, CurrentFilesPrelude, GraphBuilder, Subgraph, Supervisor, Worker, WorkerKind,
};
use troupe_agent::{LlmRouter, ToolAgent, SUPERVISOR_PROMPT};
use troupe_core::config::AppConfig;
use troupe_core::traits::{ArtifactStore, LlmClient, Prelude};
use troupe_tools::{DirStore, ToolRegistry};

pub const SUPERVISOR: &str = "supervisor";
pub const RESEARCH_TEAM: &str = "ResearchTeam";
pub const WRITING_TEAM: &str = "PaperWritingTeam";

const TOP_PROMPT: &str = "You are a supervisor tasked with managing a conversation between the \
following teams: {team_members}. Given the following user request, respond with the worker to act next. \
Each worker will perform a task and respond with their results and status. When finished, respond with FINISH.";

/// A team seat. Tools and prompt default to the kind's own; a role only
/// names them when it narrows or rewords them.
struct Role {
    name: &'static str,
    kind: WorkerKind,
    tools: Option<&'static [&'static str]>,
    prompt: Option<&'static str>,
    sees_files: bool,
}

impl Role {
    fn tools(&self) -> &'static [&'static str] {
        self.tools.unwrap_or_else(|| self.kind.default_tools())
    }

    fn prompt(&self) -> &'static str {
        self.prompt.unwrap_or_else(|| self.kind.default_prompt())
    }
}

const RESEARCHERS: &[Role] = &[
    Role {
        name: "Search",
        kind: WorkerKind::Search,
        tools: None,
        prompt: None,
        sees_files: false,
    },
    Role {
        name: "WebScraper",
        kind: WorkerKind::Scrape,
        tools: Some(&["scrape_webpages"]),
        prompt: Some(
            "You are a research assistant who can scrape specified urls for more detailed information \
             using the scrape_webpages function.",
        ),
        sees_files: false,
    },
    Role {
        name: "ReferencesScraper",
        kind: WorkerKind::Scrape,
        tools: Some(&["scrape_references"]),
        prompt: Some(
            "You are an agent focused on scraping predefined reference links using the \
             scrape_references function.",
        ),
        sees_files: false,
    },
    Role {
        name: "Translator",
        kind: WorkerKind::Translate,
        tools: None,
        prompt: None,
        sees_files: false,
    },
];

const WRITERS: &[Role] = &[
    Role {
        name: "DocWriter",
        kind: WorkerKind::Persist,
        tools: Some(&["write_document", "edit_document", "read_document"]),
        prompt: None,
        sees_files: true,
    },
    Role {
        name: "NoteTaker",
        kind: WorkerKind::Persist,
        tools: Some(&["create_outline", "read_document"]),
        prompt: Some(
            "You are an expert senior researcher tasked with writing a paper outline and \
             taking notes to craft a perfect paper.{current_files}",
        ),
        sees_files: true,
    },
];

/// The two worker teams and the graph that supervises them.
pub struct Teams {
    pub research: CompiledGraph,
    pub writing: CompiledGraph,
    pub top: CompiledGraph,
}

/// Wire everything the configuration enables.
pub fn build(config: &AppConfig) -> Result<Teams> {
    let llm: Arc<dyn LlmClient> = Arc::new(troupe_llm::client_from_config(config)?);
    let dir = config.workspace_dir();
    std::fs::create_dir_all(&dir)?;
    info!(workspace = %dir.display(), "Artifact directory ready");
    let store: Arc<dyn ArtifactStore> = Arc::new(DirStore::new(dir));
    let registry = ToolRegistry::with_builtins(config)?;
    build_with(config, llm, store, &registry)
}

pub fn build_with(
    config: &AppConfig,
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn ArtifactStore>,
    registry: &ToolRegistry,
) -> Result<Teams> {
    let wiring = Wiring {
        config,
        llm,
        store,
        registry,
    };
    let research = wiring.team(RESEARCHERS)?;
    let writing = wiring.team(WRITERS)?;

    let top = GraphBuilder::new()
        .add_supervisor(Supervisor::new(
            SUPERVISOR,
            [RESEARCH_TEAM, WRITING_TEAM],
            wiring.router(TOP_PROMPT),
        ))
        .add_subgraph(Subgraph::new(
            RESEARCH_TEAM,
            research.clone(),
            config.run.team_step_limit,
        ))
        .add_subgraph(Subgraph::new(
            WRITING_TEAM,
            writing.clone(),
            config.run.team_step_limit,
        ))
        .report_to(SUPERVISOR)
        .set_entry(SUPERVISOR)
        .compile()?;

    Ok(Teams {
        research,
        writing,
        top,
    })
}

struct Wiring<'a> {
    config: &'a AppConfig,
    llm: Arc<dyn LlmClient>,
    store: Arc<dyn ArtifactStore>,
    registry: &'a ToolRegistry,
}

impl Wiring<'_> {
    fn router(&self, prompt: &str) -> LlmRouter {
        LlmRouter::new(self.llm.clone(), self.config.model.clone()).with_prompt(prompt)
    }

    /// A supervised team over every role whose tools are configured.
    fn team(&self, roles: &[Role]) -> Result<CompiledGraph> {
        let prelude: Arc<dyn Prelude> = Arc::new(CurrentFilesPrelude::new(self.store.clone()));
        let mut builder = GraphBuilder::new();
        let mut roster = Vec::new();

        for role in roles {
            let (tools, missing) = self.registry.select(role.tools());
            if tools.is_empty() {
                warn!(worker = role.name, missing = ?missing, "No tools configured, leaving worker out");
                continue;
            }
            let agent = ToolAgent::new(
                role.name,
                self.llm.clone(),
                self.config.model.clone(),
                tools,
                role.prompt(),
            )
            .with_max_turns(self.config.run.worker_max_turns)
            .with_store(self.store.clone());

            let mut worker = Worker::new(role.name, role.kind, agent);
            if role.sees_files {
                worker = worker.with_prelude(prelude.clone());
            }
            builder = builder.add_worker(worker);
            roster.push(role.name);
        }

        let graph = builder
            .add_supervisor(Supervisor::new(SUPERVISOR, roster, self.router(SUPERVISOR_PROMPT)))
            .report_to(SUPERVISOR)
            .set_entry(SUPERVISOR)
            .compile()?;
        Ok(graph)
    }
}
