//! Operations on the priority list and the grounding routine.
//!
//! Each operation takes the current list and returns the list to save. The priority list keeps
//! `priority == index + 1` after every add, delete and reorder.

use chrono::{DateTime, Utc};

use crate::model::{RoutineTask, Task, default_routine_tasks};

/// Appends a task with the lowest priority. Returns `None` if `text` is blank.
pub fn add_task(tasks: &[Task], text: &str, now: DateTime<Utc>) -> Option<Vec<Task>> {
    if text.trim().is_empty() {
        return None;
    }

    // ids are creation millis; two tasks added within the same millisecond still need distinct ids
    let mut id = now.timestamp_millis();
    while tasks.iter().any(|task| task.id == id.to_string()) {
        id += 1;
    }

    let mut tasks = tasks.to_vec();
    tasks.push(Task {
        id: id.to_string(),
        text: text.to_string(),
        priority: 0,
        completed: false,
        created_at: now,
    });
    Some(renumber(tasks))
}

pub fn toggle_task(tasks: &[Task], id: &str) -> Vec<Task> {
    tasks
        .iter()
        .cloned()
        .map(|mut task| {
            if task.id == id {
                task.completed = !task.completed;
            }
            task
        })
        .collect()
}

pub fn delete_task(tasks: &[Task], id: &str) -> Vec<Task> {
    renumber(tasks.iter().filter(|task| task.id != id).cloned().collect())
}

/// Moves `dragged` to where `target` is, shifting the tasks in between by one.
///
/// Returns `None` when nothing would change: dropping a task on itself, or either id unknown.
pub fn reorder_task(tasks: &[Task], dragged: &str, target: &str) -> Option<Vec<Task>> {
    if dragged == target {
        return None;
    }
    let from = tasks.iter().position(|task| task.id == dragged)?;
    let to = tasks.iter().position(|task| task.id == target)?;

    let mut tasks = tasks.to_vec();
    let task = tasks.remove(from);
    tasks.insert(to, task);
    Some(renumber(tasks))
}

/// Share of completed tasks, rounded to a whole percent. An empty list is 0%.
pub fn completion_percentage(tasks: &[Task]) -> u32 {
    if tasks.is_empty() {
        return 0;
    }
    let completed = tasks.iter().filter(|task| task.completed).count();
    (completed as f64 / tasks.len() as f64 * 100.0).round() as u32
}

/// Flips one routine step. An empty routine is treated as the default one.
pub fn toggle_routine_task(routine: &[RoutineTask], id: &str) -> Vec<RoutineTask> {
    let routine = if routine.is_empty() {
        default_routine_tasks()
    } else {
        routine.to_vec()
    };
    routine
        .into_iter()
        .map(|mut step| {
            if step.id == id {
                step.completed = !step.completed;
            }
            step
        })
        .collect()
}

/// The default routine to save when `routine` is empty, so the checklist is never blank.
pub fn seeded_routine(routine: &[RoutineTask]) -> Option<Vec<RoutineTask>> {
    routine.is_empty().then(default_routine_tasks)
}

fn renumber(mut tasks: Vec<Task>) -> Vec<Task> {
    for (index, task) in tasks.iter_mut().enumerate() {
        task.priority = index as u32 + 1;
    }
    tasks
}
