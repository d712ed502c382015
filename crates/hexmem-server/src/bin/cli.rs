//! HexMem CLI
//!
//! HTTP client for a running HexMem server. Defaults come from the
//! environment: HEXMEM_URL, HEXMEM_API_KEY, HEXMEM_AGENT.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use colored::Colorize;
use serde_json::{json, Value};

/// HexMem - structured semantic memory for agents
#[derive(Parser)]
#[command(name = "hexmem")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "CLI for the HexMem memory service")]
#[command(long_about = "Talks to a running HexMem server over HTTP.\n\n\
Environment:\n  HEXMEM_URL      Server base URL (default http://127.0.0.1:8990)\n  \
HEXMEM_API_KEY  Bearer token\n  HEXMEM_AGENT    Default agent slug or id")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Direct vector search (requires an embedder on the server)
    Search {
        /// Query text
        query: String,
        /// Agent slug or id (defaults to HEXMEM_AGENT)
        #[arg(long)]
        agent: Option<String>,
        /// Maximum results
        #[arg(long, default_value = "10")]
        limit: i64,
        /// Comma-separated type filter (fact,decision,task,event,session_message)
        #[arg(long)]
        types: Option<String>,
    },

    /// Hybrid recall: semantic + keyword + recency
    Recall {
        /// Query text
        query: String,
        /// Agent slug or id (defaults to HEXMEM_AGENT)
        #[arg(long)]
        agent: Option<String>,
        /// Maximum results
        #[arg(long, default_value = "10")]
        limit: i64,
        /// Comma-separated type filter
        #[arg(long)]
        types: Option<String>,
    },

    /// Store a memory item directly (fact, decision, task, event, project)
    Store {
        /// Item type
        item_type: String,
        /// Content (facts) or title (everything else)
        text: String,
        /// Agent slug or id (defaults to HEXMEM_AGENT)
        #[arg(long)]
        agent: Option<String>,
        /// Comma-separated tags
        #[arg(long)]
        tags: Option<String>,
        /// Task priority (1-100)
        #[arg(long)]
        priority: Option<i64>,
        /// Longer body: decision text, task/event/project description
        #[arg(long)]
        description: Option<String>,
    },

    /// Server health plus decay lifecycle counts
    Status {
        /// Scope decay counts to one agent
        #[arg(long)]
        agent: Option<String>,
    },

    /// Query-log analytics summary
    Stats,

    /// List agents
    Agents,

    /// List sessions
    Sessions {
        /// Agent slug or id (defaults to HEXMEM_AGENT)
        #[arg(long)]
        agent: Option<String>,
    },

    /// Decay status, or trigger a sweep
    Decay {
        #[command(subcommand)]
        action: Option<DecayAction>,
    },
}

#[derive(Subcommand)]
enum DecayAction {
    /// Trigger a manual decay sweep
    Sweep {
        /// Scope the sweep to one agent
        #[arg(long)]
        agent: Option<String>,
    },
}

// ============================================================================
// HTTP CLIENT
// ============================================================================

struct Client {
    base: String,
    key: Option<String>,
    http: reqwest::blocking::Client,
}

impl Client {
    fn from_env() -> Self {
        let base = std::env::var("HEXMEM_URL")
            .unwrap_or_else(|_| "http://127.0.0.1:8990".to_string());
        Self {
            base: base.trim_end_matches('/').to_string(),
            key: std::env::var("HEXMEM_API_KEY").ok(),
            http: reqwest::blocking::Client::new(),
        }
    }

    fn request(
        &self,
        method: reqwest::Method,
        path: &str,
        body: Option<Value>,
    ) -> anyhow::Result<Value> {
        let mut req = self.http.request(method, format!("{}{}", self.base, path));
        if let Some(key) = &self.key {
            req = req.bearer_auth(key);
        }
        if let Some(body) = body {
            req = req.json(&body);
        }

        let response = req.send().context("request failed; is the server running?")?;
        let status = response.status();
        let value: Value = response.json().unwrap_or_else(|_| json!({}));

        if !status.is_success() {
            let message = value
                .get("error")
                .and_then(Value::as_str)
                .unwrap_or("unknown error");
            bail!("{} {}: {}", status.as_u16(), status.canonical_reason().unwrap_or(""), message);
        }
        Ok(value)
    }

    fn get(&self, path: &str) -> anyhow::Result<Value> {
        self.request(reqwest::Method::GET, path, None)
    }

    fn post(&self, path: &str, body: Value) -> anyhow::Result<Value> {
        self.request(reqwest::Method::POST, path, Some(body))
    }
}

fn default_agent(agent: Option<String>) -> anyhow::Result<String> {
    agent
        .or_else(|| std::env::var("HEXMEM_AGENT").ok())
        .filter(|a| !a.is_empty())
        .context("no agent given: pass --agent or set HEXMEM_AGENT")
}

fn split_csv(value: Option<String>) -> Vec<String> {
    value
        .map(|v| {
            v.split(',')
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

// ============================================================================
// MAIN
// ============================================================================

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = Client::from_env();

    match cli.command {
        Commands::Search {
            query,
            agent,
            limit,
            types,
        } => run_search(&client, query, agent, limit, types),
        Commands::Recall {
            query,
            agent,
            limit,
            types,
        } => run_recall(&client, query, agent, limit, types),
        Commands::Store {
            item_type,
            text,
            agent,
            tags,
            priority,
            description,
        } => run_store(&client, item_type, text, agent, tags, priority, description),
        Commands::Status { agent } => run_status(&client, agent),
        Commands::Stats => run_stats(&client),
        Commands::Agents => run_agents(&client),
        Commands::Sessions { agent } => run_sessions(&client, agent),
        Commands::Decay { action } => match action {
            Some(DecayAction::Sweep { agent }) => run_decay_sweep(&client, agent),
            None => run_decay_status(&client),
        },
    }
}

fn run_search(
    client: &Client,
    query: String,
    agent: Option<String>,
    limit: i64,
    types: Option<String>,
) -> anyhow::Result<()> {
    let mut body = json!({
        "query": query,
        "agent_id": default_agent(agent)?,
        "limit": limit,
    });
    let types = split_csv(types);
    if !types.is_empty() {
        body["types"] = json!(types);
    }

    let response = client.post("/api/v1/search", body)?;
    print_hits(&response, "similarity");
    Ok(())
}

fn run_recall(
    client: &Client,
    query: String,
    agent: Option<String>,
    limit: i64,
    types: Option<String>,
) -> anyhow::Result<()> {
    let mut body = json!({
        "query": query,
        "agent_id": default_agent(agent)?,
        "limit": limit,
    });
    let types = split_csv(types);
    if !types.is_empty() {
        body["types"] = json!(types);
    }

    let response = client.post("/api/v1/recall", body)?;
    print_hits(&response, "score");
    Ok(())
}

fn print_hits(response: &Value, score_field: &str) {
    let results = response
        .get("results")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    if results.is_empty() {
        println!("{}", "No results.".dimmed());
        return;
    }

    for result in &results {
        let score = result.get(score_field).and_then(Value::as_f64).unwrap_or(0.0);
        let kind = result.get("type").and_then(Value::as_str).unwrap_or("?");
        let content = result.get("content").and_then(Value::as_str).unwrap_or("");
        println!(
            "{} {} {}",
            format!("{:.3}", score).cyan(),
            format!("[{}]", kind).yellow(),
            content
        );

        if let Some(related) = result.get("related").and_then(Value::as_array) {
            for neighbor in related {
                let relation = neighbor
                    .pointer("/metadata/relation")
                    .and_then(Value::as_str)
                    .unwrap_or("?");
                let content = neighbor.get("content").and_then(Value::as_str).unwrap_or("");
                println!("        {} {} {}", "↳".dimmed(), relation.magenta(), content.dimmed());
            }
        }
    }
    println!();
    println!("{} results", results.len());
}

fn run_store(
    client: &Client,
    item_type: String,
    text: String,
    agent: Option<String>,
    tags: Option<String>,
    priority: Option<i64>,
    description: Option<String>,
) -> anyhow::Result<()> {
    let agent_id = default_agent(agent)?;
    let tags = split_csv(tags);

    let (path, body) = match item_type.as_str() {
        "fact" => (
            "/api/v1/facts",
            json!({ "agent_id": agent_id, "content": text, "tags": tags }),
        ),
        "decision" => (
            "/api/v1/decisions",
            json!({
                "agent_id": agent_id,
                "title": text.clone(),
                "decision": description.unwrap_or(text),
                "tags": tags,
            }),
        ),
        "task" => (
            "/api/v1/tasks",
            json!({
                "agent_id": agent_id,
                "title": text,
                "description": description,
                "priority": priority.unwrap_or(50),
                "tags": tags,
            }),
        ),
        "event" => (
            "/api/v1/events",
            json!({
                "agent_id": agent_id,
                "title": text,
                "event_type": "discovery",
                "description": description,
                "tags": tags,
            }),
        ),
        "project" => (
            "/api/v1/projects",
            json!({ "agent_id": agent_id, "name": text, "description": description, "tags": tags }),
        ),
        other => bail!(
            "unknown item type '{}' (expected fact, decision, task, event, or project)",
            other
        ),
    };

    let created = client.post(path, body)?;
    let id = created.get("id").and_then(Value::as_str).unwrap_or("?");
    println!("{} {} {}", "Stored".green().bold(), item_type, id.dimmed());
    Ok(())
}

fn run_status(client: &Client, agent: Option<String>) -> anyhow::Result<()> {
    let health = client.get("/health")?;
    println!("{}", "=== HexMem Server ===".cyan().bold());
    println!(
        "{}: {}",
        "Status".white().bold(),
        health.get("status").and_then(Value::as_str).unwrap_or("?")
    );
    println!(
        "{}: {}",
        "Version".white().bold(),
        health.get("version").and_then(Value::as_str).unwrap_or("?")
    );
    println!(
        "{}: {}",
        "Embedder".white().bold(),
        health
            .get("embedder")
            .and_then(Value::as_str)
            .unwrap_or("none")
    );

    let path = match agent.or_else(|| std::env::var("HEXMEM_AGENT").ok()) {
        Some(agent) => format!("/api/v1/decay/status?agent_id={}", agent),
        None => "/api/v1/decay/status".to_string(),
    };
    let decay = client.get(&path)?;
    println!();
    println!("{}", "=== Decay ===".cyan().bold());
    if let Some(tables) = decay.get("tables").and_then(Value::as_array) {
        for table in tables {
            println!(
                "{:<18} active {:<6} cooling {:<6} archived {}",
                table
                    .get("memory_type")
                    .and_then(Value::as_str)
                    .unwrap_or("?"),
                table.get("active").and_then(Value::as_i64).unwrap_or(0),
                table.get("cooling").and_then(Value::as_i64).unwrap_or(0),
                table.get("archived").and_then(Value::as_i64).unwrap_or(0),
            );
        }
    }
    Ok(())
}

fn run_stats(client: &Client) -> anyhow::Result<()> {
    let summary = client.get("/api/v1/analytics/queries")?;
    println!("{}", "=== Query Analytics ===".cyan().bold());
    println!(
        "{}: {}",
        "Total queries".white().bold(),
        summary.get("total_queries").and_then(Value::as_i64).unwrap_or(0)
    );
    println!(
        "{}: {:.1} ms",
        "Avg latency".white().bold(),
        summary
            .get("avg_latency_ms")
            .and_then(Value::as_f64)
            .unwrap_or(0.0)
    );
    if let Some(endpoints) = summary.get("endpoints").and_then(Value::as_object) {
        for (endpoint, count) in endpoints {
            println!("  {:<10} {}", endpoint, count.as_i64().unwrap_or(0));
        }
    }
    Ok(())
}

fn run_agents(client: &Client) -> anyhow::Result<()> {
    let agents = client.get("/api/v1/agents")?;
    let agents = agents.as_array().cloned().unwrap_or_default();
    if agents.is_empty() {
        println!("{}", "No agents.".dimmed());
        return Ok(());
    }
    for agent in agents {
        println!(
            "{} {} {}",
            agent.get("slug").and_then(Value::as_str).unwrap_or("?").green(),
            agent
                .get("display_name")
                .and_then(Value::as_str)
                .unwrap_or(""),
            agent.get("id").and_then(Value::as_str).unwrap_or("?").dimmed(),
        );
    }
    Ok(())
}

fn run_sessions(client: &Client, agent: Option<String>) -> anyhow::Result<()> {
    let path = match agent.or_else(|| std::env::var("HEXMEM_AGENT").ok()) {
        Some(agent) => format!("/api/v1/sessions?agent_id={}", agent),
        None => "/api/v1/sessions".to_string(),
    };
    let sessions = client.get(&path)?;
    let sessions = sessions.as_array().cloned().unwrap_or_default();
    if sessions.is_empty() {
        println!("{}", "No sessions.".dimmed());
        return Ok(());
    }
    for session in sessions {
        let ended = session.get("ended_at").and_then(Value::as_str);
        let marker = if ended.is_some() {
            "ended".dimmed()
        } else {
            "open".green()
        };
        println!(
            "{} {} {}",
            session.get("id").and_then(Value::as_str).unwrap_or("?"),
            marker,
            session
                .get("summary")
                .and_then(Value::as_str)
                .unwrap_or("")
                .dimmed(),
        );
    }
    Ok(())
}

fn run_decay_status(client: &Client) -> anyhow::Result<()> {
    run_status(client, None)
}

fn run_decay_sweep(client: &Client, agent: Option<String>) -> anyhow::Result<()> {
    let path = match agent {
        Some(agent) => format!("/api/v1/decay/sweep?agent_id={}", agent),
        None => "/api/v1/decay/sweep".to_string(),
    };
    let stats = client.post(&path, json!({}))?;
    println!("{}", "Sweep complete".green().bold());
    println!(
        "  cooled {}  archived {}  immune {}",
        stats
            .get("transitioned_to_cooling")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        stats
            .get("transitioned_to_archived")
            .and_then(Value::as_i64)
            .unwrap_or(0),
        stats.get("immune_items").and_then(Value::as_i64).unwrap_or(0),
    );
    Ok(())
}
