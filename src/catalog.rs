//! The template catalog: every template the platform offers, with a full text
//! index over the fields users search by.

use std::collections::{BTreeMap, HashMap};
use std::sync::Mutex;

use rusqlite::{Connection, params};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::api::{ApiError, PlatformApi};
use crate::notify::{Notification, Notifier};
use crate::search_query::{self, MatchPlan};
use crate::template::{Template, TemplateSummary};

const CREATE_INDEX_SQL: &str = "CREATE VIRTUAL TABLE template_index USING fts5(
    ref UNINDEXED, kind, name, title, description, tags, creates,
    tokenize = 'porter unicode61'
)";

#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("template index error: {0}")]
    Index(#[from] rusqlite::Error),
    #[error("template index is unavailable")]
    IndexUnavailable,
    #[error(transparent)]
    Api(#[from] ApiError),
    #[error("platform returned status {status} when listing templates")]
    Status { status: u16 },
    #[error("could not decode template list: {0}")]
    Decode(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TitleEntry {
    Unique(usize),
    /// More than one template shares the title.
    Ambiguous,
}

pub struct TemplateCatalog {
    templates: Vec<Template>,
    index: Mutex<Connection>,
    titles: HashMap<String, TitleEntry>,
}

fn title_key(title: &str) -> String {
    title.trim().to_lowercase()
}

fn build_index(templates: &[Template]) -> Result<Connection, rusqlite::Error> {
    let mut conn = Connection::open_in_memory()?;
    conn.execute(CREATE_INDEX_SQL, [])?;
    let tx = conn.transaction()?;
    {
        let mut insert = tx.prepare(
            "INSERT INTO template_index (rowid, ref, kind, name, title, description, tags, creates)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        )?;
        for (i, template) in templates.iter().enumerate() {
            insert.execute(params![
                row_id(i),
                template.template_ref(),
                template.kind,
                template.metadata.name,
                template.metadata.title,
                template.metadata.description.clone().unwrap_or_default(),
                template.metadata.tags.join(" "),
                template.creates_kinds().join(" "),
            ])?;
        }
    }
    tx.commit()?;
    Ok(conn)
}

fn row_id(position: usize) -> i64 {
    position as i64 + 1
}

fn build_titles(templates: &[Template]) -> HashMap<String, TitleEntry> {
    let mut titles = HashMap::new();
    for (i, template) in templates.iter().enumerate() {
        titles
            .entry(title_key(template.title()))
            .and_modify(|entry| *entry = TitleEntry::Ambiguous)
            .or_insert(TitleEntry::Unique(i));
    }
    titles
}

impl TemplateCatalog {
    pub fn from_templates(templates: Vec<Template>) -> Result<Self, CatalogError> {
        let index = build_index(&templates)?;
        let titles = build_titles(&templates);
        let ambiguous = titles
            .values()
            .filter(|e| **e == TitleEntry::Ambiguous)
            .count();
        if ambiguous > 0 {
            warn!(count = ambiguous, "duplicate_template_titles");
        }
        debug!(count = templates.len(), "template_index_built");
        Ok(Self {
            templates,
            index: Mutex::new(index),
            titles,
        })
    }

    pub fn empty() -> Result<Self, CatalogError> {
        Self::from_templates(Vec::new())
    }

    /// Fetch the template list from the platform and build a catalog from it.
    pub async fn load(
        api: &dyn PlatformApi,
        notifier: &dyn Notifier,
    ) -> Result<Self, CatalogError> {
        let result = api.list_templates().await?;
        if let Some(challenge) = &result.auth_challenge {
            info!(realm = %challenge.realm, "provider_authorization_requested");
            notifier.notify(Notification::authorize_provider(challenge));
        }
        if !result.success {
            return Err(CatalogError::Status {
                status: result.status,
            });
        }
        let templates: Vec<Template> = serde_json::from_value(result.json)?;
        info!(count = templates.len(), "templates_loaded");
        Self::from_templates(templates)
    }

    /// Re-fetch the template list. The current contents stay in place on failure.
    pub async fn refresh(
        &mut self,
        api: &dyn PlatformApi,
        notifier: &dyn Notifier,
    ) -> Result<usize, CatalogError> {
        *self = Self::load(api, notifier).await?;
        Ok(self.templates.len())
    }

    pub fn len(&self) -> usize {
        self.templates.len()
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty()
    }

    /// Search with the agent query language. Results are ordered best first.
    pub fn search(&self, query: &str) -> Result<Vec<Template>, CatalogError> {
        let terms = search_query::parse_query(query);
        let Some(plan) = search_query::build_match_plan(&terms) else {
            return Ok(Vec::new());
        };
        self.run_plan(&plan)
    }

    /// Templates containing `term` as a whole phrase, optionally only in `fields`.
    pub fn search_exact(
        &self,
        term: &str,
        fields: Option<&[&str]>,
    ) -> Result<Vec<Template>, CatalogError> {
        if !term.chars().any(char::is_alphanumeric) {
            return Ok(Vec::new());
        }
        let columns: Vec<&str> = fields
            .unwrap_or_default()
            .iter()
            .copied()
            .filter(|f| search_query::INDEXED_FIELDS.contains(f))
            .collect();
        let expression = format!(
            "{}{}",
            search_query::column_filter(&columns),
            search_query::quote(term.trim())
        );
        self.run_plan(&MatchPlan {
            include: Some(expression),
            exclude: None,
        })
    }

    fn run_plan(&self, plan: &MatchPlan) -> Result<Vec<Template>, CatalogError> {
        let conn = self
            .index
            .lock()
            .map_err(|_| CatalogError::IndexUnavailable)?;

        let rows: Vec<i64> = match (&plan.include, &plan.exclude) {
            (Some(include), None) => {
                let mut stmt = conn.prepare(
                    "SELECT rowid FROM template_index WHERE template_index MATCH ?1
                     ORDER BY rank, rowid",
                )?;
                let ids = stmt.query_map(params![include], |row| row.get(0))?;
                ids.collect::<Result<_, _>>()?
            }
            (Some(include), Some(exclude)) => {
                let mut stmt = conn.prepare(
                    "SELECT rowid FROM template_index WHERE template_index MATCH ?1
                     AND rowid NOT IN (SELECT rowid FROM template_index WHERE template_index MATCH ?2)
                     ORDER BY rank, rowid",
                )?;
                let ids = stmt.query_map(params![include, exclude], |row| row.get(0))?;
                ids.collect::<Result<_, _>>()?
            }
            (None, Some(exclude)) => {
                let mut stmt = conn.prepare(
                    "SELECT rowid FROM template_index
                     WHERE rowid NOT IN (SELECT rowid FROM template_index WHERE template_index MATCH ?1)
                     ORDER BY rowid",
                )?;
                let ids = stmt.query_map(params![exclude], |row| row.get(0))?;
                ids.collect::<Result<_, _>>()?
            }
            (None, None) => Vec::new(),
        };

        Ok(rows
            .into_iter()
            .filter_map(|id| usize::try_from(id - 1).ok())
            .filter_map(|i| self.templates.get(i).cloned())
            .collect())
    }

    /// Case-insensitive title lookup. `None` when the title is unknown or shared.
    pub fn lookup_by_title(&self, title: &str) -> Option<&Template> {
        match self.titles.get(&title_key(title))? {
            TitleEntry::Unique(i) => self.templates.get(*i),
            TitleEntry::Ambiguous => None,
        }
    }

    pub fn lookup_by_ref(&self, template_ref: &str) -> Option<&Template> {
        self.templates
            .iter()
            .find(|t| t.template_ref() == template_ref)
    }

    pub fn ref_to_title_map(&self) -> BTreeMap<String, String> {
        self.templates
            .iter()
            .map(|t| (t.template_ref(), t.title().to_string()))
            .collect()
    }

    pub fn summaries(&self) -> Vec<TemplateSummary> {
        self.templates.iter().map(|t| t.summary(None)).collect()
    }
}
