//! Functional-area epic resolution.
//!
//! Tasks land in epics named after what they touch (`<project>-auth-epic`,
//! `<project>-api-epic`, ...), never in auto-numbered scaffolding
//! placeholders. Resolution prefers an existing epic with token overlap,
//! synthesizes an area epic when none exists, and falls back to the
//! project's main epic when no area can be inferred.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use taskforge_store::{is_scaffolding_epic_id, StorageEngine};
use taskforge_types::{CoreError, CoreResult, Epic, EpicId};

/// Functional-area vocabulary: area name and the tokens that signal it.
const AREA_TOKENS: &[(&str, &[&str])] = &[
    ("auth", &["auth", "authentication", "authorization", "login", "logout", "oauth", "password", "token", "session"]),
    ("api", &["api", "endpoint", "rest", "graphql", "route", "request", "response"]),
    ("ui", &["ui", "frontend", "component", "view", "page", "layout", "css", "style", "render"]),
    ("data", &["data", "database", "schema", "migration", "sql", "query", "model", "storage"]),
    ("integration", &["integration", "webhook", "sync", "external", "third-party", "connector"]),
    ("admin", &["admin", "dashboard", "management", "moderation"]),
    ("performance", &["performance", "cache", "caching", "latency", "optimize", "optimization", "profiling"]),
    ("user-management", &["user", "profile", "account", "role", "permission"]),
    ("content-management", &["content", "cms", "article", "media", "upload"]),
    ("documentation", &["documentation", "docs", "readme", "guide"]),
];

/// Where a resolved epic came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EpicSource {
    /// An existing epic matched the task's functional area.
    Existing,
    /// A new functional-area epic was created.
    Created,
    /// No area could be inferred; the project main epic was used.
    Fallback,
}

/// The task attributes epic resolution looks at.
#[derive(Debug, Clone, Default)]
pub struct TaskContext {
    /// Task title.
    pub title: String,
    /// Task description.
    pub description: String,
    /// Task tags.
    pub tags: Vec<String>,
    /// Explicit functional area, when the caller already knows it.
    pub functional_area: Option<String>,
}

/// Outcome of epic resolution.
#[derive(Debug, Clone)]
pub struct EpicResolution {
    /// Resolved epic ID; guaranteed to pass the anti-scaffolding check.
    pub epic_id: EpicId,
    /// Epic display title.
    pub epic_name: String,
    /// How the epic was found.
    pub source: EpicSource,
    /// Whether a new epic was created by this resolution.
    pub created: bool,
}

/// Maps tasks to functional-area epics, creating them on demand.
pub struct EpicResolver {
    store: Arc<StorageEngine>,
}

impl EpicResolver {
    /// Creates a resolver over the store.
    pub fn new(store: Arc<StorageEngine>) -> Self {
        Self { store }
    }

    /// Resolves the epic a task belongs in.
    pub async fn resolve_epic_context(
        &self,
        project_id: &str,
        context: &TaskContext,
    ) -> CoreResult<EpicResolution> {
        let area = context
            .functional_area
            .clone()
            .filter(|a| !a.trim().is_empty())
            .or_else(|| infer_area(context));

        let resolution = match area {
            Some(area) => self.resolve_area_epic(project_id, &area).await?,
            None => self.resolve_fallback_epic(project_id).await?,
        };

        // Belt and braces: nothing matching the scaffolding patterns may
        // ever leave this function.
        if is_scaffolding_epic_id(&resolution.epic_id) {
            return Err(CoreError::ScaffoldingEpicRejected(resolution.epic_id));
        }
        Ok(resolution)
    }

    /// Finds or creates the epic for an inferred functional area.
    async fn resolve_area_epic(
        &self,
        project_id: &str,
        area: &str,
    ) -> CoreResult<EpicResolution> {
        let canonical_id = format!("{project_id}-{area}-epic");
        let area_tokens = tokens_for_area(area);

        let mut best: Option<(usize, Epic)> = None;
        for epic in self.store.list_epics(Some(project_id)).await? {
            if epic.epic_id == canonical_id {
                best = Some((usize::MAX, epic));
                break;
            }
            let overlap = token_overlap(&area_tokens, &epic_tokens(&epic));
            if overlap >= 1 && best.as_ref().map_or(true, |(score, _)| overlap > *score) {
                best = Some((overlap, epic));
            }
        }

        if let Some((_, epic)) = best {
            debug!(project = project_id, area, epic = %epic.epic_id, "matched existing epic");
            return Ok(EpicResolution {
                epic_id: epic.epic_id,
                epic_name: epic.title,
                source: EpicSource::Existing,
                created: false,
            });
        }

        let title = humanize_area(area);
        let created = self.create_epic(project_id, &canonical_id, &title).await?;
        if created {
            info!(project = project_id, epic = %canonical_id, "created functional-area epic");
        }
        Ok(EpicResolution {
            epic_id: canonical_id,
            epic_name: title,
            source: if created {
                EpicSource::Created
            } else {
                EpicSource::Existing
            },
            created,
        })
    }

    /// Finds or creates the project's main epic.
    async fn resolve_fallback_epic(&self, project_id: &str) -> CoreResult<EpicResolution> {
        let epic_id = format!("{project_id}-main-epic");
        if self.store.exists(&epic_id).await {
            let epic = self.store.get_epic(&epic_id).await?;
            return Ok(EpicResolution {
                epic_id,
                epic_name: epic.title,
                source: EpicSource::Fallback,
                created: false,
            });
        }
        let created = self.create_epic(project_id, &epic_id, "Main").await?;
        Ok(EpicResolution {
            epic_id,
            epic_name: "Main".to_string(),
            source: EpicSource::Fallback,
            created,
        })
    }

    /// Persists a new epic and links it into the owning project when the
    /// project record exists. Returns false when another worker created
    /// the epic first; that race resolves to reuse, not failure.
    async fn create_epic(&self, project_id: &str, epic_id: &str, title: &str) -> CoreResult<bool> {
        let mut epic = Epic::new(epic_id, project_id, title);
        epic.description = format!("{title} work for {project_id}");
        match self.store.create_epic(epic).await {
            Ok(_) => {}
            Err(CoreError::Conflict(_)) => return Ok(false),
            Err(e) => return Err(e),
        }

        if let Ok(mut project) = self.store.get_project(project_id).await {
            if !project.epic_ids.iter().any(|e| e == epic_id) {
                project.epic_ids.push(epic_id.to_string());
                project.metadata.updated_at = chrono::Utc::now();
                self.store.update_project(project).await?;
            }
        }
        Ok(true)
    }
}

/// Picks the functional area with the highest token overlap (at least one)
/// against the task's title, description, and tags.
fn infer_area(context: &TaskContext) -> Option<String> {
    let mut text_tokens: HashSet<String> = tokenize(&context.title);
    text_tokens.extend(tokenize(&context.description));
    for tag in &context.tags {
        text_tokens.extend(tokenize(tag));
    }

    let mut best: Option<(&str, usize)> = None;
    for (area, tokens) in AREA_TOKENS {
        let overlap = tokens
            .iter()
            .filter(|t| text_tokens.contains(**t))
            .count();
        if overlap >= 1 && best.map_or(true, |(_, score)| overlap > score) {
            best = Some((area, overlap));
        }
    }
    best.map(|(area, _)| area.to_string())
}

fn tokens_for_area(area: &str) -> HashSet<String> {
    AREA_TOKENS
        .iter()
        .find(|(a, _)| *a == area)
        .map(|(a, tokens)| {
            let mut set: HashSet<String> = tokens.iter().map(|t| t.to_string()).collect();
            set.insert(a.to_string());
            set
        })
        .unwrap_or_else(|| HashSet::from([area.to_string()]))
}

fn epic_tokens(epic: &Epic) -> HashSet<String> {
    let mut tokens = tokenize(&epic.title);
    tokens.extend(tokenize(&epic.description));
    tokens.extend(tokenize(&epic.epic_id));
    tokens
}

fn token_overlap(a: &HashSet<String>, b: &HashSet<String>) -> usize {
    a.intersection(b).count()
}

fn tokenize(text: &str) -> HashSet<String> {
    text.split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(str::to_ascii_lowercase)
        .collect()
}

fn humanize_area(area: &str) -> String {
    area.split('-')
        .map(|word| {
            let mut chars = word.chars();
            match chars.next() {
                Some(first) => first.to_ascii_uppercase().to_string() + chars.as_str(),
                None => String::new(),
            }
        })
        .collect::<Vec<_>>()
        .join(" ")
}
