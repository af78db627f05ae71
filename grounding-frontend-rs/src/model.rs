use chrono::{DateTime, Utc};
use docsync::{EncodeError, Fields, SyncedDocument, Value};
use serde::{Deserialize, Deserializer, Serialize, de::DeserializeOwned};

#[derive(
    Copy, Clone, Debug, Serialize, Deserialize, PartialEq, Eq, Ord, PartialOrd, tsify::Tsify, Hash,
)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum EmotionalState {
    Calm,
    Anxious,
    Overwhelmed,
    Focused,
    Energized,
    Tired,
    Happy,
    Sad,
}

impl EmotionalState {
    pub const ALL: [EmotionalState; 8] = [
        EmotionalState::Calm,
        EmotionalState::Anxious,
        EmotionalState::Overwhelmed,
        EmotionalState::Focused,
        EmotionalState::Energized,
        EmotionalState::Tired,
        EmotionalState::Happy,
        EmotionalState::Sad,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            EmotionalState::Calm => "Calm",
            EmotionalState::Anxious => "Anxious",
            EmotionalState::Overwhelmed => "Overwhelmed",
            EmotionalState::Focused => "Focused",
            EmotionalState::Energized => "Energized",
            EmotionalState::Tired => "Tired",
            EmotionalState::Happy => "Happy",
            EmotionalState::Sad => "Sad",
        }
    }

    /// Tailwind classes for the badge showing this state.
    pub fn color_class(&self) -> &'static str {
        match self {
            EmotionalState::Calm => "bg-blue-100 text-blue-800",
            EmotionalState::Anxious => "bg-yellow-100 text-yellow-800",
            EmotionalState::Overwhelmed => "bg-red-100 text-red-800",
            EmotionalState::Focused => "bg-green-100 text-green-800",
            EmotionalState::Energized => "bg-purple-100 text-purple-800",
            EmotionalState::Tired => "bg-gray-100 text-gray-800",
            EmotionalState::Happy => "bg-pink-100 text-pink-800",
            EmotionalState::Sad => "bg-indigo-100 text-indigo-800",
        }
    }
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct MoodEntry {
    pub state: EmotionalState,
    #[serde(with = "docsync::timestamp")]
    #[tsify(type = "string")]
    pub timestamp: DateTime<Utc>,
    /// 1 to 10
    #[serde(deserialize_with = "lenient_intensity")]
    pub intensity: u8,
}

/// Accepts any number, rounded and clamped into 1..=10.
fn lenient_intensity<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u8, D::Error> {
    let intensity = f64::deserialize(deserializer)?;
    Ok(intensity.round().clamp(1.0, 10.0) as u8)
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct Task {
    pub id: String,
    pub text: String,
    /// 1-based position in the list
    #[serde(default)]
    pub priority: u32,
    #[serde(default)]
    pub completed: bool,
    #[serde(default, with = "docsync::timestamp")]
    #[tsify(type = "string")]
    pub created_at: DateTime<Utc>,
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct RoutineTask {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// The five-step sensory routine every user starts with.
pub fn default_routine_tasks() -> Vec<RoutineTask> {
    [
        ("1", "Name 5 things you can see"),
        ("2", "Name 4 things you can touch"),
        ("3", "Name 3 things you can hear"),
        ("4", "Name 2 things you can smell"),
        ("5", "Name 1 thing you can taste"),
    ]
    .into_iter()
    .map(|(id, text)| RoutineTask {
        id: id.to_string(),
        text: text.to_string(),
        completed: false,
    })
    .collect()
}

/// Everything stored for one user. Mirrors their remote document field for field.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct AppData {
    #[serde(default)]
    pub mood_history: Vec<MoodEntry>,
    #[serde(default)]
    pub tasks: Vec<Task>,
    #[serde(default = "default_routine_tasks")]
    pub routine_tasks: Vec<RoutineTask>,
    #[serde(default)]
    pub reflections: Vec<String>,
    #[serde(default, with = "docsync::timestamp::option")]
    #[tsify(type = "string | null")]
    pub last_saved: Option<DateTime<Utc>>,
}

impl Default for AppData {
    fn default() -> Self {
        Self {
            mood_history: vec![],
            tasks: vec![],
            routine_tasks: default_routine_tasks(),
            reflections: vec![],
            last_saved: None,
        }
    }
}

/// A partial update to [`AppData`]. Present fields replace the current value whole.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
#[serde(rename_all = "camelCase")]
pub struct AppDataPatch {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mood_history: Option<Vec<MoodEntry>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tasks: Option<Vec<Task>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub routine_tasks: Option<Vec<RoutineTask>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reflections: Option<Vec<String>>,
}

impl AppDataPatch {
    pub fn tasks(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Some(tasks),
            ..Default::default()
        }
    }

    pub fn mood_history(mood_history: Vec<MoodEntry>) -> Self {
        Self {
            mood_history: Some(mood_history),
            ..Default::default()
        }
    }

    pub fn routine_tasks(routine_tasks: Vec<RoutineTask>) -> Self {
        Self {
            routine_tasks: Some(routine_tasks),
            ..Default::default()
        }
    }

    pub fn reflections(reflections: Vec<String>) -> Self {
        Self {
            reflections: Some(reflections),
            ..Default::default()
        }
    }

    pub fn is_empty(&self) -> bool {
        self.mood_history.is_none()
            && self.tasks.is_none()
            && self.routine_tasks.is_none()
            && self.reflections.is_none()
    }
}

/// Decodes a JSON list one element at a time, skipping (and logging) elements that don't fit.
/// `null` is an empty list and so is anything else that isn't a list.
pub(crate) fn decode_each<T: DeserializeOwned>(name: &str, value: serde_json::Value) -> Vec<T> {
    match value {
        serde_json::Value::Null => vec![],
        serde_json::Value::Array(items) => items
            .into_iter()
            .enumerate()
            .filter_map(|(index, item)| match serde_json::from_value(item) {
                Ok(item) => Some(item),
                Err(e) => {
                    log::warn!("Skipping unreadable {name}[{index}]: {e}");
                    None
                }
            })
            .collect(),
        other => {
            log::warn!("Ignoring {name}: expected a list, got {other}");
            vec![]
        }
    }
}

impl SyncedDocument for AppData {
    type Patch = AppDataPatch;

    fn initial_fields() -> Result<Fields, EncodeError> {
        let mut fields = AppData::default().to_fields()?;
        fields.insert("lastSaved".to_string(), Value::ServerTimestamp);
        Ok(fields)
    }

    /// Never fails: each collection is read on its own and unreadable elements are dropped, so
    /// one bad entry doesn't hide the rest of the document.
    fn from_fields(mut fields: Fields) -> Result<Self, serde_json::Error> {
        let mut take = |name: &str| fields.shift_remove(name).map(serde_json::Value::from);

        let mood_history = take("moodHistory")
            .map(|value| decode_each("moodHistory", value))
            .unwrap_or_default();
        let tasks = take("tasks")
            .map(|value| decode_each("tasks", value))
            .unwrap_or_default();
        let routine_tasks = match take("routineTasks") {
            None | Some(serde_json::Value::Null) => default_routine_tasks(),
            Some(value) => decode_each("routineTasks", value),
        };
        let reflections = take("reflections")
            .map(|value| decode_each("reflections", value))
            .unwrap_or_default();
        let last_saved = take("lastSaved").and_then(|value| {
            serde_json::from_value(value)
                .inspect_err(|e| log::warn!("Ignoring unreadable lastSaved: {e}"))
                .ok()
        });

        Ok(AppData {
            mood_history,
            tasks,
            routine_tasks,
            reflections,
            last_saved,
        })
    }

    fn merge(mut self, patch: AppDataPatch) -> Self {
        if let Some(mood_history) = patch.mood_history {
            self.mood_history = mood_history;
        }
        if let Some(tasks) = patch.tasks {
            self.tasks = tasks;
        }
        if let Some(routine_tasks) = patch.routine_tasks {
            self.routine_tasks = routine_tasks;
        }
        if let Some(reflections) = patch.reflections {
            self.reflections = reflections;
        }
        self
    }

    fn touch(&mut self, saved_at: DateTime<Utc>) {
        self.last_saved = Some(saved_at);
    }
}

/// Where the user is doing the exercise. Only shown, never stored.
#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, Eq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub enum LocationType {
    Home,
    Work,
    Outdoors,
    Transit,
    Other(String),
}

impl LocationType {
    pub fn display(&self) -> &str {
        match self {
            LocationType::Home => "Home",
            LocationType::Work => "Work",
            LocationType::Outdoors => "Outdoors",
            LocationType::Transit => "Transit",
            LocationType::Other(custom) if custom.is_empty() => "Custom Location",
            LocationType::Other(custom) => custom,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsync::value::normalize_fields;

    fn at(seconds: i64) -> DateTime<Utc> {
        DateTime::from_timestamp(seconds, 0).unwrap()
    }

    fn sample() -> AppData {
        AppData {
            mood_history: vec![MoodEntry {
                state: EmotionalState::Anxious,
                timestamp: at(1_700_000_000),
                intensity: 8,
            }],
            tasks: vec![Task {
                id: "17".into(),
                text: "water plants".into(),
                priority: 1,
                completed: true,
                created_at: at(1_700_000_100),
            }],
            routine_tasks: default_routine_tasks(),
            reflections: vec!["1/2/2024: ok".into()],
            last_saved: Some(at(1_700_000_200)),
        }
    }

    #[test]
    fn document_fields_use_persisted_names() {
        let fields = sample().to_fields().unwrap();
        let keys: Vec<&str> = fields.keys().map(String::as_str).collect();
        assert_eq!(
            keys,
            [
                "moodHistory",
                "tasks",
                "routineTasks",
                "reflections",
                "lastSaved"
            ]
        );
        let task = fields["tasks"].clone();
        let Value::Array(tasks) = task else {
            panic!("tasks should be an array");
        };
        let task = tasks[0].as_map().unwrap();
        assert!(matches!(task["createdAt"], Value::Timestamp(_)));
        assert_eq!(task["priority"], Value::Integer(1));
    }

    #[test]
    fn remote_fields_decode_back_to_the_same_data() {
        let data = sample();
        let decoded = AppData::from_fields(normalize_fields(data.to_fields().unwrap())).unwrap();
        assert_eq!(decoded, data);
    }

    #[test]
    fn missing_routine_tasks_fall_back_to_defaults() {
        let mut fields = sample().to_fields().unwrap();
        fields.shift_remove("routineTasks");
        fields.shift_remove("moodHistory");
        let decoded = AppData::from_fields(normalize_fields(fields)).unwrap();
        assert_eq!(decoded.routine_tasks, default_routine_tasks());
        assert!(decoded.mood_history.is_empty());
        assert_eq!(decoded.tasks.len(), 1);
    }

    #[test]
    fn initial_document_asks_for_a_server_timestamp() {
        let fields = AppData::initial_fields().unwrap();
        assert_eq!(fields["lastSaved"], Value::ServerTimestamp);
        assert_eq!(
            fields["routineTasks"],
            docsync::to_value(&default_routine_tasks()).unwrap()
        );
        assert_eq!(fields["tasks"], Value::Array(vec![]));
    }

    #[test]
    fn unreadable_elements_are_skipped_one_by_one() {
        let mut fields = sample().to_fields().unwrap();
        fields.insert(
            "tasks".to_string(),
            Value::Array(vec![
                Value::map([
                    ("id", Value::String("1".into())),
                    ("text", Value::String("no date".into())),
                ]),
                Value::map([("id", Value::Integer(2))]),
                docsync::to_value(&sample().tasks[0]).unwrap(),
            ]),
        );
        fields.insert(
            "moodHistory".to_string(),
            Value::Array(vec![
                Value::map([
                    ("state", Value::String("Calm".into())),
                    ("timestamp", Value::String("2024-01-01T00:00:00Z".into())),
                    ("intensity", Value::Double(6.6)),
                ]),
                Value::map([("state", Value::String("Bored".into()))]),
            ]),
        );
        fields.insert("lastSaved".to_string(), Value::String("yesterday".into()));

        let decoded = AppData::from_fields(normalize_fields(fields)).unwrap();

        assert_eq!(decoded.tasks.len(), 2);
        assert_eq!(decoded.tasks[0].text, "no date");
        assert_eq!(decoded.tasks[0].priority, 0);
        assert_eq!(decoded.tasks[0].created_at, DateTime::<Utc>::UNIX_EPOCH);
        assert_eq!(decoded.tasks[1], sample().tasks[0]);
        assert_eq!(decoded.mood_history.len(), 1);
        assert_eq!(decoded.mood_history[0].intensity, 7);
        assert_eq!(decoded.reflections, sample().reflections);
        assert_eq!(decoded.last_saved, None);
    }

    #[test]
    fn merge_replaces_only_present_fields() {
        let data = sample();
        let merged = data
            .clone()
            .merge(AppDataPatch::reflections(vec!["new".into()]));
        assert_eq!(merged.reflections, vec!["new".to_string()]);
        assert_eq!(merged.tasks, data.tasks);
        assert_eq!(merged.mood_history, data.mood_history);

        let unchanged = data.clone().merge(AppDataPatch::default());
        assert_eq!(unchanged, data);
    }

    #[test]
    fn emotional_states_serialize_by_name() {
        for state in EmotionalState::ALL {
            assert_eq!(
                serde_json::to_value(state).unwrap(),
                serde_json::Value::String(state.label().to_string())
            );
        }
    }

    #[test]
    fn other_location_shows_custom_text() {
        assert_eq!(LocationType::Transit.display(), "Transit");
        assert_eq!(LocationType::Other("Gym".into()).display(), "Gym");
        assert_eq!(LocationType::Other(String::new()).display(), "Custom Location");
    }
}
