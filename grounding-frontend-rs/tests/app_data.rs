use std::{cell::RefCell, collections::VecDeque, rc::Rc};

use chrono::DateTime;
use docsync::{
    BackendTimestamp, DocumentStore, Fields, Identity, Snapshot, StoreError, Subscription,
    SyncSession, Value, memory::MemoryStore,
};
use futures::{
    channel::oneshot,
    executor::{LocalPool, block_on},
    task::LocalSpawnExt,
};
use grounding_frontend_rs::{
    AppData, AppDataPatch, EmotionalState,
    model::default_routine_tasks,
    mood, tasks,
    transfer::{export_json, import_json},
};

fn user(uid: &str) -> Option<Identity> {
    Some(Identity {
        uid: uid.to_string(),
        email: Some(format!("{uid}@example.com")),
        id_token: None,
    })
}

fn signed_in(store: &MemoryStore) -> SyncSession<AppData, MemoryStore> {
    let session = SyncSession::new(store.clone());
    block_on(session.set_identity(user("u1")));
    session
}

fn at(millis: i64) -> chrono::DateTime<chrono::Utc> {
    DateTime::from_timestamp_millis(millis).unwrap()
}

#[test]
fn new_user_gets_a_seeded_document() {
    let store = MemoryStore::new();
    let session = signed_in(&store);

    let document = store.document("u1").unwrap();
    assert_eq!(document["tasks"], Value::Array(vec![]));
    assert!(matches!(document["lastSaved"], Value::Timestamp(_)));

    let data = session.data();
    assert_eq!(data.routine_tasks, default_routine_tasks());
    assert!(data.mood_history.is_empty());
    assert!(data.last_saved.is_some());
    assert!(!session.loading());
}

#[test]
fn document_without_routine_gets_the_default_one() {
    let store = MemoryStore::new();
    store.put_document(
        "u1",
        Fields::from_iter([(
            "reflections".to_string(),
            Value::Array(vec![Value::String("1/1/2024: hi".into())]),
        )]),
    );
    let session = signed_in(&store);

    let data = session.data();
    assert_eq!(data.reflections, ["1/1/2024: hi"]);
    assert_eq!(data.routine_tasks, default_routine_tasks());
}

fn remote_mood(state: &str, seconds: i64) -> Value {
    Value::map([
        ("state", Value::String(state.into())),
        (
            "timestamp",
            Value::Timestamp(BackendTimestamp { seconds, nanos: 0 }),
        ),
        ("intensity", Value::Integer(5)),
    ])
}

#[test]
fn one_bad_task_does_not_cost_the_rest_of_the_document() {
    let store = MemoryStore::new();
    store.put_document(
        "u1",
        Fields::from_iter([
            (
                "moodHistory".to_string(),
                Value::Array(vec![
                    remote_mood("Calm", 1_700_000_000),
                    remote_mood("Tired", 1_700_000_100),
                    remote_mood("Happy", 1_700_000_200),
                ]),
            ),
            (
                "reflections".to_string(),
                Value::Array(vec![Value::String("1/1/2024: hi".into())]),
            ),
            (
                "tasks".to_string(),
                Value::Array(vec![
                    Value::map([
                        ("id", Value::String("1".into())),
                        ("text", Value::String("no createdAt".into())),
                        ("priority", Value::Integer(1)),
                        ("completed", Value::Bool(false)),
                    ]),
                    Value::map([("id", Value::Integer(2))]),
                ]),
            ),
        ]),
    );
    let session = signed_in(&store);

    let data = session.data();
    assert_eq!(data.mood_history.len(), 3);
    assert_eq!(data.reflections, ["1/1/2024: hi"]);
    assert_eq!(data.tasks.len(), 1);
    assert_eq!(data.tasks[0].text, "no createdAt");

    let history = session.with_data(|data| {
        mood::log_mood(&data.mood_history, EmotionalState::Calm, 2, at(1_700_000_300_000))
    });
    block_on(session.save(AppDataPatch::mood_history(history)));

    let document = store.document("u1").unwrap();
    let Value::Array(remote_moods) = &document["moodHistory"] else {
        panic!("moodHistory should be an array");
    };
    assert_eq!(remote_moods.len(), 4);
    assert_eq!(
        document["reflections"],
        Value::Array(vec![Value::String("1/1/2024: hi".into())])
    );
}

#[test]
fn task_edits_keep_priorities_dense_locally_and_remotely() {
    let store = MemoryStore::new();
    let session = signed_in(&store);

    for (i, text) in ["a", "b", "c"].into_iter().enumerate() {
        let added = session
            .with_data(|data| tasks::add_task(&data.tasks, text, at(10 + i as i64)))
            .unwrap();
        block_on(session.save(AppDataPatch::tasks(added)));
    }
    let reordered = session
        .with_data(|data| tasks::reorder_task(&data.tasks, "12", "10"))
        .unwrap();
    block_on(session.save(AppDataPatch::tasks(reordered)));
    let remaining = session.with_data(|data| tasks::delete_task(&data.tasks, "10"));
    block_on(session.save(AppDataPatch::tasks(remaining)));

    let data = session.data();
    let order: Vec<(&str, u32)> = data
        .tasks
        .iter()
        .map(|task| (task.id.as_str(), task.priority))
        .collect();
    assert_eq!(order, [("12", 1), ("11", 2)]);

    let document = store.document("u1").unwrap();
    let Value::Array(remote) = &document["tasks"] else {
        panic!("tasks should be an array");
    };
    let remote_priorities: Vec<&Value> = remote
        .iter()
        .map(|task| &task.as_map().unwrap()["priority"])
        .collect();
    assert_eq!(remote_priorities, [&Value::Integer(1), &Value::Integer(2)]);
}

#[test]
fn logged_moods_round_trip_through_the_store() {
    let store = MemoryStore::new();
    let session = signed_in(&store);

    let history = session.with_data(|data| {
        mood::log_mood(&data.mood_history, EmotionalState::Tired, 9, at(1_700_000_000_000))
    });
    block_on(session.save(AppDataPatch::mood_history(history)));

    let other_tab = signed_in(&store);
    let data = other_tab.data();
    assert_eq!(data.mood_history.len(), 1);
    assert_eq!(data.mood_history[0].state, EmotionalState::Tired);
    assert_eq!(data.mood_history[0].timestamp, at(1_700_000_000_000));
    assert_eq!(
        mood::recommendations(&data.mood_history, &data.tasks),
        ["Take a short walk outside to boost your energy naturally"]
    );
}

#[test]
fn empty_save_changes_only_last_saved() {
    let store = MemoryStore::new();
    let session = signed_in(&store);
    block_on(session.save(AppDataPatch::reflections(vec!["x".into()])));
    let before = session.data();

    block_on(session.save(AppDataPatch::default()));

    let after = session.data();
    assert_eq!(
        AppData {
            last_saved: None,
            ..after.clone()
        },
        AppData {
            last_saved: None,
            ..before.clone()
        }
    );
    assert!(after.last_saved >= before.last_saved);
}

#[test]
fn importing_only_tasks_empties_everything_else() {
    let store = MemoryStore::new();
    let session = signed_in(&store);
    block_on(session.save(AppDataPatch {
        reflections: Some(vec!["old".into()]),
        mood_history: Some(mood::log_mood(&[], EmotionalState::Calm, 3, at(0))),
        ..Default::default()
    }));

    let patch = import_json(
        r#"{"tasks": [
            {"id": "1", "text": "breathe", "priority": 1, "completed": false,
             "createdAt": "2024-01-01T08:00:00Z"}
        ]}"#,
    )
    .unwrap();
    block_on(session.save(patch));

    let data = session.data();
    assert_eq!(data.tasks.len(), 1);
    assert_eq!(data.tasks[0].text, "breathe");
    assert!(data.mood_history.is_empty());
    assert!(data.routine_tasks.is_empty());
    assert!(data.reflections.is_empty());
    assert_eq!(
        store.document("u1").unwrap()["routineTasks"],
        Value::Array(vec![])
    );
}

#[test]
fn export_then_import_restores_the_collections() {
    let store = MemoryStore::new();
    let session = signed_in(&store);
    let added = tasks::add_task(&[], "walk", at(5)).unwrap();
    block_on(session.save(AppDataPatch::tasks(added)));
    let exported = session.with_data(export_json).unwrap();

    block_on(session.save(AppDataPatch::tasks(vec![])));
    block_on(session.save(import_json(&exported).unwrap()));

    let data = session.data();
    assert_eq!(data.tasks.len(), 1);
    assert_eq!(data.tasks[0].text, "walk");
    assert_eq!(data.routine_tasks, default_routine_tasks());
}

#[test]
fn failed_import_leaves_state_untouched() {
    let store = MemoryStore::new();
    let session = signed_in(&store);
    block_on(session.save(AppDataPatch::reflections(vec!["keep".into()])));
    let writes = store.requests().merge_writes;

    assert!(import_json("not json at all").is_err());

    assert_eq!(store.requests().merge_writes, writes);
    assert_eq!(session.data().reflections, ["keep"]);
}

/// Holds every merge-write until it is released.
#[derive(Clone, Default)]
struct GatedStore {
    memory: MemoryStore,
    gates: Rc<RefCell<VecDeque<oneshot::Sender<()>>>>,
}

impl GatedStore {
    fn release_next_write(&self) {
        let gate = self.gates.borrow_mut().pop_front().expect("no write pending");
        gate.send(()).unwrap();
    }
}

impl DocumentStore for GatedStore {
    async fn get(&self, key: &str) -> Result<Option<Snapshot>, StoreError> {
        self.memory.get(key).await
    }

    async fn create(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        self.memory.create(key, fields).await
    }

    async fn merge_write(&self, key: &str, fields: Fields) -> Result<(), StoreError> {
        let (sender, receiver) = oneshot::channel();
        self.gates.borrow_mut().push_back(sender);
        let _ = receiver.await;
        self.memory.merge_write(key, fields).await
    }

    fn subscribe(
        &self,
        key: &str,
        on_change: impl Fn(Option<&Snapshot>) + 'static,
    ) -> Subscription {
        self.memory.subscribe(key, on_change)
    }
}

/// Both saves merge against the state from before either write landed, and each writes the
/// whole document, so the later write silently drops the earlier one's tasks.
#[test]
fn overlapping_saves_are_last_write_wins() {
    let store = GatedStore::default();
    let session = Rc::new(SyncSession::<AppData, _>::new(store.clone()));
    block_on(session.set_identity(user("u1")));

    let mut pool = LocalPool::new();
    let spawner = pool.spawner();
    let new_tasks = tasks::add_task(&[], "X", at(1)).unwrap();
    {
        let session = Rc::clone(&session);
        let new_tasks = new_tasks.clone();
        spawner
            .spawn_local(async move { session.save(AppDataPatch::tasks(new_tasks)).await })
            .unwrap();
    }
    pool.run_until_stalled();
    {
        let session = Rc::clone(&session);
        spawner
            .spawn_local(async move {
                session
                    .save(AppDataPatch::reflections(vec!["Y".into()]))
                    .await
            })
            .unwrap();
    }
    pool.run_until_stalled();

    store.release_next_write();
    pool.run_until_stalled();
    assert_eq!(session.data().tasks, new_tasks);

    store.release_next_write();
    pool.run_until_stalled();

    let data = session.data();
    assert_eq!(data.reflections, ["Y"]);
    assert!(data.tasks.is_empty());
    assert_eq!(
        store.memory.document("u1").unwrap()["tasks"],
        Value::Array(vec![])
    );
}
