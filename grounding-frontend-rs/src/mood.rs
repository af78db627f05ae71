use chrono::{DateTime, FixedOffset, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{EmotionalState, MoodEntry, Task};

pub const MIN_INTENSITY: u8 = 1;
pub const MAX_INTENSITY: u8 = 10;

/// How many of the latest mood entries [`recommendations`] looks at.
const RECENT_ENTRIES: usize = 3;

/// Appends a mood entry. Intensity is clamped to 1..=10.
pub fn log_mood(
    history: &[MoodEntry],
    state: EmotionalState,
    intensity: u8,
    now: DateTime<Utc>,
) -> Vec<MoodEntry> {
    let mut history = history.to_vec();
    history.push(MoodEntry {
        state,
        timestamp: now,
        intensity: intensity.clamp(MIN_INTENSITY, MAX_INTENSITY),
    });
    history
}

/// Entries logged on `date`, by UTC calendar day.
pub fn mood_history_on(history: &[MoodEntry], date: NaiveDate) -> Vec<MoodEntry> {
    history
        .iter()
        .filter(|entry| entry.timestamp.date_naive() == date)
        .cloned()
        .collect()
}

#[derive(Clone, Debug, Serialize, Deserialize, PartialEq, tsify::Tsify)]
#[tsify(into_wasm_abi, from_wasm_abi)]
pub struct MoodChartPoint {
    /// Local time of day, `HH:MM`
    pub time: String,
    pub intensity: u8,
    pub state: EmotionalState,
}

pub fn mood_chart_points(history: &[MoodEntry], offset: FixedOffset) -> Vec<MoodChartPoint> {
    history
        .iter()
        .map(|entry| MoodChartPoint {
            time: entry
                .timestamp
                .with_timezone(&offset)
                .format("%H:%M")
                .to_string(),
            intensity: entry.intensity,
            state: entry.state,
        })
        .collect()
}

/// Suggestions based on the last few mood entries and the task list. Never empty.
pub fn recommendations(history: &[MoodEntry], tasks: &[Task]) -> Vec<&'static str> {
    let recent = &history[history.len().saturating_sub(RECENT_ENTRIES)..];
    let recently = |state: EmotionalState, above: u8| {
        recent
            .iter()
            .any(|entry| entry.state == state && entry.intensity > above)
    };

    let mut recommendations = vec![];
    if recently(EmotionalState::Anxious, 7) {
        recommendations.push("Try the 4-7-8 breathing exercise to calm your nervous system");
    }
    if recently(EmotionalState::Tired, 6) {
        recommendations.push("Take a short walk outside to boost your energy naturally");
    }
    if !tasks.is_empty() && tasks.iter().all(|task| !task.completed) {
        recommendations.push("Start with your highest priority task to build momentum");
    }
    if recommendations.is_empty() {
        recommendations.push("Practice the 5-4-3-2-1 grounding technique for centering");
    }
    recommendations
}
