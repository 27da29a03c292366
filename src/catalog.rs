//! Catalog listing.
//!
//! Only the newest version of every (owner, name) pair is listed. The
//! candidate set comes out of SQL already deduplicated and tag-filtered; the
//! free-text filter (substring or trigram similarity) and pagination run over
//! it here, so the total always describes the filtered set before the page
//! is cut.

use serde::{Deserialize, Serialize};

use crate::db::Database;
use crate::error::AppResult;
use crate::models::PackageSummary;
use crate::search;

const LATEST_PACKAGES_SQL: &str = r#"
SELECT p.id, p.name, p.owner_id, u.username AS owner, p.version, p.published,
       p.short_description, p.description, p.runtime, p.reviewed,
       (p.logo IS NOT NULL) AS has_logo
FROM packages p
JOIN users u ON u.id = p.owner_id
WHERE p.version = (
        SELECT MAX(q.version) FROM packages q
        WHERE q.owner_id = p.owner_id AND q.name = p.name
      )
  AND (?1 IS NULL OR EXISTS (
        SELECT 1 FROM tags t WHERE t.package_id = p.id AND t.name = ?1
      ))
ORDER BY p.id ASC
"#;

/// Query string of the listing endpoint.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct CatalogQuery {
    #[serde(default)]
    pub since: i64,
    pub tag: Option<String>,
    pub term: Option<String>,
}

impl CatalogQuery {
    /// Blank filters mean no filter at all.
    pub fn normalized(self) -> Self {
        Self {
            since: self.since,
            tag: non_blank(self.tag),
            term: non_blank(self.term),
        }
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogEntry {
    pub identifier: Option<String>,
    #[serde(flatten)]
    pub package: PackageSummary,
}

impl From<PackageSummary> for CatalogEntry {
    fn from(package: PackageSummary) -> Self {
        Self {
            identifier: package.identifier(),
            package,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CatalogPage {
    pub packages: Vec<CatalogEntry>,
    pub total: usize,
    pub since: i64,
    /// Cursor for the following page
    pub next: Option<i64>,
    pub tags: Vec<String>,
    pub filtered_by_tag: bool,
}

/// Case-insensitive substring of name or descriptions, or a fuzzy name match.
pub fn matches_term(package: &PackageSummary, term: &str) -> bool {
    let needle = term.to_lowercase();
    let contains = |text: &str| text.to_lowercase().contains(&needle);

    contains(&package.name)
        || package.short_description.as_deref().is_some_and(contains)
        || package.description.as_deref().is_some_and(contains)
        || search::is_similar(&package.name, term)
}

/// Apply the text filter and cut one page out of the latest-version candidates.
///
/// `candidates` must be in ascending id order.
pub fn paginate(
    candidates: Vec<PackageSummary>,
    query: &CatalogQuery,
    page_size: usize,
) -> (Vec<PackageSummary>, usize, Option<i64>) {
    let filtered: Vec<PackageSummary> = match &query.term {
        Some(term) => candidates
            .into_iter()
            .filter(|p| matches_term(p, term))
            .collect(),
        None => candidates,
    };
    let total = filtered.len();

    let mut remaining = filtered.into_iter().filter(|p| p.id >= query.since);
    let page: Vec<PackageSummary> = remaining.by_ref().take(page_size).collect();
    let next = remaining.next().map(|p| p.id);

    (page, total, next)
}

pub async fn latest_packages(db: &Database, tag: Option<&str>) -> AppResult<Vec<PackageSummary>> {
    let rows = sqlx::query_as::<_, PackageSummary>(LATEST_PACKAGES_SQL)
        .bind(tag)
        .fetch_all(db.pool())
        .await?;
    Ok(rows)
}

pub async fn tag_names(db: &Database) -> AppResult<Vec<String>> {
    let names = sqlx::query_scalar::<_, String>("SELECT DISTINCT name FROM tags ORDER BY name")
        .fetch_all(db.pool())
        .await?;
    Ok(names)
}

/// Build one page of the package catalog.
pub async fn list(db: &Database, query: CatalogQuery, page_size: usize) -> AppResult<CatalogPage> {
    let query = query.normalized();

    let candidates = latest_packages(db, query.tag.as_deref()).await?;
    let (page, total, next) = paginate(candidates, &query, page_size);

    let (tags, filtered_by_tag) = match &query.tag {
        Some(tag) => (vec![tag.clone()], true),
        None => (tag_names(db).await?, false),
    };

    Ok(CatalogPage {
        packages: page.into_iter().map(CatalogEntry::from).collect(),
        total,
        since: query.since,
        next,
        tags,
        filtered_by_tag,
    })
}
