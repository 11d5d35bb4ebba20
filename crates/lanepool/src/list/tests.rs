use crate::{DrainingList, Error, Result};
use core::time::Duration;
use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};
use tokio::time::{Instant, sleep};

#[test]
fn push_join_pop_tail() {
    let list = DrainingList::new();
    list.push(2).unwrap();
    list.push(3).unwrap();
    list.join(1).unwrap();
    assert_eq!(list.len(), 3);

    assert_eq!(list.pop(), Some(1));
    assert_eq!(list.tail(), Some(3));
    assert_eq!(list.pop(), Some(2));
    assert_eq!(list.pop(), None);
    assert_eq!(list.tail(), None);
    assert!(list.is_empty());
}

#[test]
fn clear_empties_without_closing() {
    let list = DrainingList::new();
    for i in 0..10 {
        list.push(i).unwrap();
    }
    list.clear();
    assert!(list.is_empty());
    assert!(!list.is_closed());
    list.push(11).unwrap();
    assert_eq!(list.pop(), Some(11));
}

#[tokio::test]
async fn consumer_drains_in_order() {
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let list = DrainingList::new();

    assert!(list.set_consumer(
        move |item: u32| -> Result<()> {
            sink.lock().unwrap().push(item);
            Ok(())
        },
        Duration::from_millis(1),
    ));

    for i in 0..50 {
        list.push(i).unwrap();
    }

    let deadline = Instant::now() + Duration::from_secs(5);
    while seen.lock().unwrap().len() < 50 {
        assert!(Instant::now() < deadline, "consumer stalled");
        sleep(Duration::from_millis(1)).await;
    }

    assert_eq!(*seen.lock().unwrap(), (0..50).collect::<Vec<_>>());
    list.quit(false).await.unwrap();
}

#[tokio::test]
async fn second_consumer_is_ignored() {
    let list = DrainingList::<u8>::new();
    assert!(list.set_consumer(|_: u8| -> Result<()> { Ok(()) }, Duration::ZERO));
    assert!(!list.set_consumer(|_: u8| -> Result<()> { Ok(()) }, Duration::ZERO));
    list.quit(true).await.unwrap();
    assert!(!list.set_consumer(|_: u8| -> Result<()> { Ok(()) }, Duration::ZERO));
}

#[tokio::test]
async fn graceful_quit_consumes_everything() {
    const N: usize = 1_000;
    let consumed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&consumed);
    let list = DrainingList::new();

    // A long pace keeps the background task mostly asleep, so most items are
    // left for the drain in `quit`.
    assert!(list.set_consumer(
        move |_: usize| -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        Duration::from_secs(3600),
    ));

    for i in 0..N {
        list.push(i).unwrap();
    }
    list.quit(false).await.unwrap();

    assert_eq!(consumed.load(Ordering::SeqCst), N);
    assert_eq!(list.len(), 0);
    assert!(list.is_closed());
}

#[tokio::test]
async fn forced_quit_discards_remaining() {
    let consumed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&consumed);
    let list = DrainingList::new();
    for i in 0..100 {
        list.push(i).unwrap();
    }

    // Nothing is consumed before the consumer task gets scheduled.
    assert!(list.set_consumer(
        move |_: i32| -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok(())
        },
        Duration::from_secs(3600),
    ));
    list.quit(true).await.unwrap();

    assert!(consumed.load(Ordering::SeqCst) < 100);
    assert_eq!(list.len(), 0);
}

#[tokio::test]
async fn closed_list_refuses_work() {
    let list = DrainingList::new();
    list.push(1).unwrap();
    list.quit(false).await.unwrap();

    assert_eq!(list.push(2), Err(Error::AlreadyClosed));
    assert_eq!(list.join(0), Err(Error::AlreadyClosed));
    assert_eq!(list.pop(), None);
    assert_eq!(list.len(), 0);
    assert_eq!(list.quit(false).await, Err(Error::AlreadyClosed));
}

#[tokio::test]
async fn consumer_failures_do_not_stop_draining() {
    let consumed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&consumed);
    let list = DrainingList::new();
    assert!(list.set_consumer(
        move |item: u32| -> Result<()> {
            counter.fetch_add(1, Ordering::SeqCst);
            match item % 3 {
                0 => Err(Error::callback("rejected")),
                1 => panic!("consumer panic on {item}"),
                _ => Ok(()),
            }
        },
        Duration::from_secs(3600),
    ));

    for i in 0..30 {
        list.push(i).unwrap();
    }
    list.quit(false).await.unwrap();

    assert_eq!(consumed.load(Ordering::SeqCst), 30);
}
