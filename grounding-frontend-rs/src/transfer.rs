//! Moving a user's data in and out of the app as a JSON file.

use serde::{Serialize, de::DeserializeOwned};

use crate::model::{AppData, AppDataPatch, MoodEntry, RoutineTask, Task, decode_each};

pub const EXPORT_FILE_NAME: &str = "grounding-app-data.json";

#[derive(Debug, thiserror::Error)]
pub enum ImportError {
    #[error("File is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Export<'a> {
    mood_history: &'a [MoodEntry],
    tasks: &'a [Task],
    routine_tasks: &'a [RoutineTask],
    reflections: &'a [String],
}

/// Pretty-printed JSON of everything except `lastSaved`.
pub fn export_json(data: &AppData) -> Result<String, serde_json::Error> {
    serde_json::to_string_pretty(&Export {
        mood_history: &data.mood_history,
        tasks: &data.tasks,
        routine_tasks: &data.routine_tasks,
        reflections: &data.reflections,
    })
}

/// Turns an exported file back into a patch that sets all four collections.
///
/// Only text that isn't JSON at all is rejected. Collections missing from the file become
/// empty, and so does everything when the file isn't a JSON object. Elements that don't fit the
/// data model are skipped one at a time.
pub fn import_json(json: &str) -> Result<AppDataPatch, ImportError> {
    let value: serde_json::Value = serde_json::from_str(json)?;
    let mut object = match value {
        serde_json::Value::Object(object) => object,
        _ => {
            log::warn!("Imported file is not a JSON object, clearing every collection");
            serde_json::Map::new()
        }
    };

    Ok(AppDataPatch {
        mood_history: Some(take_field(&mut object, "moodHistory")),
        tasks: Some(take_field(&mut object, "tasks")),
        routine_tasks: Some(take_field(&mut object, "routineTasks")),
        reflections: Some(take_field(&mut object, "reflections")),
    })
}

fn take_field<T: DeserializeOwned>(
    object: &mut serde_json::Map<String, serde_json::Value>,
    name: &str,
) -> Vec<T> {
    object
        .remove(name)
        .map(|value| decode_each(name, value))
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::default_routine_tasks;
    use chrono::DateTime;

    fn data() -> AppData {
        AppData {
            tasks: vec![Task {
                id: "1".into(),
                text: "stretch".into(),
                priority: 1,
                completed: false,
                created_at: DateTime::from_timestamp(1_700_000_000, 0).unwrap(),
            }],
            reflections: vec!["1/1/2024: fine".into()],
            last_saved: Some(DateTime::from_timestamp(1_700_000_500, 0).unwrap()),
            ..AppData::default()
        }
    }

    #[test]
    fn export_has_the_four_collections() {
        let json = export_json(&data()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        let keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        assert_eq!(keys.len(), 4);
        assert!(value.get("lastSaved").is_none());
        assert_eq!(value["tasks"][0]["createdAt"], "2023-11-14T22:13:20Z");
        assert!(json.contains('\n'));
    }

    #[test]
    fn exported_file_imports_back() {
        let data = data();
        let patch = import_json(&export_json(&data).unwrap()).unwrap();
        assert_eq!(patch.tasks, Some(data.tasks));
        assert_eq!(patch.reflections, Some(data.reflections));
        assert_eq!(patch.routine_tasks, Some(default_routine_tasks()));
        assert_eq!(patch.mood_history, Some(vec![]));
    }

    #[test]
    fn missing_collections_become_empty() {
        let patch = import_json(
            r#"{"tasks": [{"id": "9", "text": "call mum", "priority": 1, "completed": true,
                "createdAt": "2024-05-01T10:00:00Z"}]}"#,
        )
        .unwrap();
        let tasks = patch.tasks.unwrap();
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].text, "call mum");
        assert_eq!(patch.mood_history, Some(vec![]));
        assert_eq!(patch.routine_tasks, Some(vec![]));
        assert_eq!(patch.reflections, Some(vec![]));
    }

    #[test]
    fn mistyped_collections_become_empty() {
        let patch = import_json(r#"{"tasks": "nope", "reflections": ["a", "b"]}"#).unwrap();
        assert_eq!(patch.tasks, Some(vec![]));
        assert_eq!(
            patch.reflections,
            Some(vec!["a".to_string(), "b".to_string()])
        );
    }

    #[test]
    fn unreadable_tasks_are_skipped_and_the_rest_kept() {
        let patch = import_json(
            r#"{"tasks": [
                {"id": "1", "text": "keep me", "priority": 1, "completed": false,
                 "createdAt": "2024-05-01T10:00:00Z"},
                {"id": "2", "text": "no priority", "createdAt": "2024-05-01T11:00:00Z"},
                {"id": "3", "text": 42},
                "not a task"
            ]}"#,
        )
        .unwrap();
        let tasks = patch.tasks.unwrap();
        let texts: Vec<&str> = tasks.iter().map(|task| task.text.as_str()).collect();
        assert_eq!(texts, ["keep me", "no priority"]);
        assert_eq!(tasks[1].priority, 0);
    }

    #[test]
    fn only_unparseable_files_are_rejected() {
        assert!(matches!(
            import_json("{not json"),
            Err(ImportError::Parse(_))
        ));

        for json in ["[1, 2]", "42", "null"] {
            let patch = import_json(json).unwrap();
            assert_eq!(patch.tasks, Some(vec![]));
            assert_eq!(patch.mood_history, Some(vec![]));
            assert_eq!(patch.routine_tasks, Some(vec![]));
            assert_eq!(patch.reflections, Some(vec![]));
        }
    }
}
