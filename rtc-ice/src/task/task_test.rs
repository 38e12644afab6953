use super::*;
use std::time::Duration;

#[test]
fn test_task_queue_orders_by_deadline_then_post_order() {
    let now = Instant::now();
    let mut queue = TaskQueue::default();
    assert_eq!(queue.next_deadline(), None);

    queue.post_at(now + Duration::from_millis(48), Task::CheckAndPing);
    queue.post_at(now, Task::Sort);
    queue.post_at(now, Task::CheckAndPing);

    assert_eq!(queue.next_deadline(), Some(now));
    assert_eq!(queue.pending(Task::CheckAndPing), 2);
    assert_eq!(queue.pending(Task::Sort), 1);

    assert_eq!(queue.pop_due(now), Some(Task::Sort));
    assert_eq!(queue.pop_due(now), Some(Task::CheckAndPing));
    assert_eq!(queue.pop_due(now), None, "not due yet");
    assert_eq!(queue.next_deadline(), Some(now + Duration::from_millis(48)));

    assert_eq!(
        queue.pop_due(now + Duration::from_millis(50)),
        Some(Task::CheckAndPing)
    );
    assert!(queue.is_empty());
}

#[test]
fn test_task_queue_clear() {
    let now = Instant::now();
    let mut queue = TaskQueue::default();
    queue.post_at(now, Task::Sort);
    queue.clear();
    assert_eq!(queue.pop_due(now), None);
    assert_eq!(queue.pending(Task::Sort), 0);
}
