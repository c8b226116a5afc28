use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Name of the catch-all category assigned when no keyword matches.
pub const UNCATEGORIZED: &str = "Uncategorized";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    #[serde(default)]
    pub id: Option<i64>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Comma-separated match keywords, e.g. "restaurant,grocery,pizza".
    #[serde(default)]
    pub keywords: String,
    /// Display color as a hex string, e.g. "#EF4444".
    #[serde(default)]
    pub color: String,
    #[serde(default = "default_active")]
    pub is_active: bool,
}

fn default_active() -> bool {
    true
}

impl Category {
    /// Normalized keywords: lowercased, trimmed, empties dropped.
    pub fn keyword_list(&self) -> Vec<String> {
        self.keywords
            .split(',')
            .map(|k| k.trim().to_lowercase())
            .filter(|k| !k.is_empty())
            .collect()
    }
}

#[derive(Deserialize)]
struct CategoryFile {
    categories: Vec<Category>,
}

/// Parse category definitions from a TOML document with `[[categories]]`
/// tables.
pub fn categories_from_toml(content: &str) -> Result<Vec<Category>, String> {
    let file: CategoryFile =
        toml::from_str(content).map_err(|e| format!("Failed to parse TOML: {e}"))?;
    Ok(file.categories)
}

/// Internal pairing of a category id with its normalized keywords.
struct CompiledCategory {
    id: i64,
    keywords: Vec<String>,
}

/// A read-only snapshot of the active categories, taken once per
/// consultation window. Callers hold it for the duration of one batch and
/// re-load when [`KeywordClassifier::is_stale`] reports the TTL elapsed;
/// category edits therefore become visible within one TTL, without any
/// shared mutable state.
pub struct KeywordClassifier {
    categories: Vec<CompiledCategory>,
    loaded_at: DateTime<Utc>,
    ttl: chrono::Duration,
}

impl KeywordClassifier {
    pub const DEFAULT_TTL_SECS: i64 = 300;

    /// Build a snapshot. Inactive categories and categories without an id
    /// or keywords can never match and are excluded.
    pub fn new(categories: Vec<Category>) -> Self {
        let compiled = categories
            .into_iter()
            .filter(|c| c.is_active)
            .filter_map(|c| {
                let keywords = c.keyword_list();
                match (c.id, keywords.is_empty()) {
                    (Some(id), false) => Some(CompiledCategory { id, keywords }),
                    _ => None,
                }
            })
            .collect();
        Self {
            categories: compiled,
            loaded_at: Utc::now(),
            ttl: chrono::Duration::seconds(Self::DEFAULT_TTL_SECS),
        }
    }

    pub fn with_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.ttl = ttl;
        self
    }

    pub fn is_stale(&self) -> bool {
        Utc::now() - self.loaded_at > self.ttl
    }

    pub fn is_empty(&self) -> bool {
        self.categories.is_empty()
    }

    /// First category (in snapshot order) with any keyword contained in
    /// `text`. Callers pass already-lowercased text, typically
    /// [`crate::Transaction::search_text`].
    pub fn classify(&self, text: &str) -> Option<i64> {
        self.categories
            .iter()
            .find(|c| c.keywords.iter().any(|k| text.contains(k.as_str())))
            .map(|c| c.id)
    }
}

/// Outcome counters for one categorization batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct CategorizeStats {
    pub total: usize,
    pub categorized: usize,
    pub skipped: usize,
    pub errors: usize,
}

/// Seed data for a fresh ledger: (name, description, keywords, color).
pub const DEFAULT_CATEGORIES: &[(&str, &str, &str, &str)] = &[
    (
        "Food & Dining",
        "Restaurants, groceries, food delivery",
        "restaurant,food,grocery,dining,pizza,mcdonald,starbucks,uber eats,doordash,grubhub,safeway,walmart,costco,whole foods",
        "#EF4444",
    ),
    (
        "Transportation",
        "Gas, car payments, public transit, rideshare",
        "gas,fuel,uber,lyft,taxi,bus,train,parking,car payment,auto,vehicle,chevron,shell,exxon",
        "#3B82F6",
    ),
    (
        "Shopping",
        "Clothing, electronics, general retail",
        "amazon,target,best buy,clothing,shopping,retail,electronics,shoes,apparel",
        "#8B5CF6",
    ),
    (
        "Bills & Utilities",
        "Rent, electricity, water, phone, internet",
        "rent,utilities,electric,water,phone,internet,cable,insurance,mortgage,utility,bill",
        "#F59E0B",
    ),
    (
        "Entertainment",
        "Movies, games, streaming services, hobbies",
        "netflix,spotify,movie,theater,gaming,entertainment,hobby,subscription,steam,apple music",
        "#10B981",
    ),
    (
        "Healthcare",
        "Medical expenses, pharmacy, insurance",
        "medical,doctor,hospital,pharmacy,health,dental,medicine,prescription",
        "#F43F5E",
    ),
    (
        "Education",
        "Tuition, books, courses, training",
        "school,education,tuition,books,course,training,university,college,learning",
        "#06B6D4",
    ),
    (
        "Travel",
        "Flights, hotels, vacation expenses",
        "flight,hotel,travel,vacation,airbnb,airline,booking,expedia,trip",
        "#84CC16",
    ),
    (
        "Income",
        "Salary, wages, freelance income",
        "salary,payroll,income,wages,freelance,bonus,commission,payment",
        "#22C55E",
    ),
    (
        UNCATEGORIZED,
        "Transactions that need manual categorization",
        "",
        "#6B7280",
    ),
];
