use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

/// Distinct endorsements needed to verify a habit, a report or a piece of
/// resolution evidence.
pub const VERIFICATION_THRESHOLD: usize = 3;

const DEFAULT_AVATAR_SHAPE: &str = "alien";
const DEFAULT_AVATAR_COLOR: &str = "#10b981";

/// Avatar descriptor. Stored rows carry either an object or a JSON string of
/// one, with `type`/`bgColor` or `shape`/`color` keys; both collapse into
/// this shape on deserialization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Avatar {
    pub shape: String,
    pub color: String,
}

impl Default for Avatar {
    fn default() -> Self {
        Self {
            shape: DEFAULT_AVATAR_SHAPE.to_string(),
            color: DEFAULT_AVATAR_COLOR.to_string(),
        }
    }
}

impl Avatar {
    pub fn normalize(value: &Value) -> Self {
        match value {
            Value::String(raw) => serde_json::from_str::<Value>(raw)
                .ok()
                .filter(Value::is_object)
                .map(|parsed| Self::normalize(&parsed))
                .unwrap_or_default(),
            Value::Object(map) => {
                let shape = map
                    .get("shape")
                    .or_else(|| map.get("type"))
                    .and_then(Value::as_str)
                    .filter(|shape| !shape.is_empty());
                let color = map
                    .get("color")
                    .or_else(|| map.get("bgColor"))
                    .and_then(Value::as_str)
                    .filter(|color| !color.is_empty());
                match shape {
                    Some(shape) => Self {
                        shape: shape.to_string(),
                        color: color.unwrap_or(DEFAULT_AVATAR_COLOR).to_string(),
                    },
                    None => Self::default(),
                }
            }
            _ => Self::default(),
        }
    }
}

impl<'de> Deserialize<'de> for Avatar {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let value = Value::deserialize(deserializer)?;
        Ok(Self::normalize(&value))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Category {
    Organic,
    Plastic,
    Paper,
    Glass,
    Metal,
    Electronic,
    Hazardous,
}

impl Category {
    pub const ALL: [Category; 7] = [
        Category::Organic,
        Category::Plastic,
        Category::Paper,
        Category::Glass,
        Category::Metal,
        Category::Electronic,
        Category::Hazardous,
    ];

    pub fn label(self) -> &'static str {
        match self {
            Category::Organic => "Organic",
            Category::Plastic => "Plastic",
            Category::Paper => "Paper/Cardboard",
            Category::Glass => "Glass",
            Category::Metal => "Metal",
            Category::Electronic => "Electronic",
            Category::Hazardous => "Hazardous",
        }
    }

    pub fn icon(self) -> &'static str {
        match self {
            Category::Organic => "🍂",
            Category::Plastic => "🥤",
            Category::Paper => "📄",
            Category::Glass => "🍾",
            Category::Metal => "🥫",
            Category::Electronic => "🔌",
            Category::Hazardous => "⚠️",
        }
    }

    /// Used when a habit is submitted without its own description.
    pub fn action_description(self) -> &'static str {
        match self {
            Category::Organic => "Separated food scraps for composting",
            Category::Plastic => "Recycled bottles and containers",
            Category::Paper => "Separated clean paper for recycling",
            Category::Glass => "Separated glass jars and bottles",
            Category::Metal => "Separated aluminium and steel cans",
            Category::Electronic => "Took devices to an e-waste collection point",
            Category::Hazardous => "Took batteries or chemicals to a drop-off point",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comment {
    pub author: String,
    pub text: String,
    pub timestamp: DateTime<Utc>,
}

/// Community-visible recycling action awaiting peer verification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Habit {
    pub id: String,
    pub user_id: String,
    pub user_nickname: String,
    #[serde(default)]
    pub user_avatar: Avatar,
    pub category: Category,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub verified: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResolutionEvidence {
    pub submitter: String,
    pub image_url: String,
    #[serde(default)]
    pub description: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(default)]
    pub checks: Vec<String>,
}

/// Illegal dumping site reported to the community.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: String,
    pub user_id: String,
    pub user_nickname: String,
    #[serde(default)]
    pub user_avatar: Avatar,
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub checks: Vec<String>,
    #[serde(default)]
    pub comments: Vec<Comment>,
    #[serde(default)]
    pub resolution_evidences: Vec<ResolutionEvidence>,
    #[serde(default)]
    pub resolved: bool,
    #[serde(default)]
    pub verified: bool,
}

impl Report {
    /// True once any resolution evidence has been confirmed by the community.
    pub fn has_confirmed_resolution(&self) -> bool {
        self.resolution_evidences
            .iter()
            .any(|evidence| evidence.checks.len() >= VERIFICATION_THRESHOLD)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivityKind {
    Habit,
    Report,
}

/// Ledger row written when a community item crosses the verification
/// threshold. Outlives the habit itself, which is deleted at that moment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VerifiedActivity {
    pub id: String,
    pub user_id: String,
    pub kind: ActivityKind,
    pub source_id: String,
    #[serde(default)]
    pub category: Option<Category>,
    /// Creation time of the source item, not of the ledger row.
    pub created_at: DateTime<Utc>,
    pub verified_at: DateTime<Utc>,
    #[serde(default)]
    pub endorsers: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Frequency {
    #[default]
    Daily,
    Weekly,
    Monthly,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalEvidence {
    pub image_url: String,
    #[serde(default)]
    pub description: String,
    pub date: DateTime<Utc>,
    #[serde(default)]
    pub verification_count: usize,
    #[serde(default)]
    pub shared_habit_id: Option<String>,
}

/// A user's private plan, distinct from the community [`Habit`] created when
/// evidence is attached to it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalHabit {
    pub id: String,
    pub category: Category,
    pub description: String,
    pub quantity: u32,
    #[serde(default)]
    pub frequency: Frequency,
    #[serde(default)]
    pub streak: u32,
    #[serde(default)]
    pub completed_dates: Vec<NaiveDate>,
    #[serde(default)]
    pub evidence: Vec<PersonalEvidence>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PersonalReport {
    pub id: String,
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
    pub image_url: String,
    pub created_at: DateTime<Utc>,
    pub shared_report_id: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserRecord {
    pub id: String,
    pub nickname: String,
    pub password_hash: String,
    #[serde(default)]
    pub avatar: Avatar,
    pub created_at: DateTime<Utc>,
    #[serde(default)]
    pub selected_badge: Option<String>,
    #[serde(default)]
    pub weekly_badges: Vec<u32>,
    #[serde(default)]
    pub unlocked_achievements: Vec<String>,
    #[serde(default)]
    pub habits: Vec<PersonalHabit>,
    #[serde(default)]
    pub reports: Vec<PersonalReport>,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    pub nickname: String,
    pub password: String,
    #[serde(default)]
    pub avatar: Value,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserSummary {
    pub id: String,
    pub nickname: String,
    pub avatar: Avatar,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub nickname: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct SelectBadgeRequest {
    #[serde(default)]
    pub badge_id: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewHabitRequest {
    pub category: Category,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewPersonalHabitRequest {
    pub category: Category,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_quantity")]
    pub quantity: u32,
    #[serde(default)]
    pub frequency: Frequency,
}

fn default_quantity() -> u32 {
    1
}

#[derive(Debug, Deserialize)]
pub struct EvidenceRequest {
    pub image_url: String,
    #[serde(default)]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NewReportRequest {
    pub location: String,
    #[serde(default)]
    pub description: Option<String>,
    pub image_url: String,
}

#[derive(Debug, Deserialize)]
pub struct CommentRequest {
    pub text: String,
}

#[derive(Debug, Deserialize)]
pub struct UploadQuery {
    #[serde(default)]
    pub ext: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UploadResponse {
    pub url: String,
}

/// Catalogue entry for the category picker.
#[derive(Debug, Serialize)]
pub struct CategoryInfo {
    pub value: Category,
    pub label: &'static str,
    pub icon: &'static str,
    pub action_description: &'static str,
}

impl From<Category> for CategoryInfo {
    fn from(category: Category) -> Self {
        Self {
            value: category,
            label: category.label(),
            icon: category.icon(),
            action_description: category.action_description(),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct FeedResponse {
    pub habits: Vec<Habit>,
    pub reports: Vec<Report>,
    pub poll_interval_secs: u64,
}
