//! Round-trip tests through a live daemon on a Unix socket.

use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};
use taskdag::{
    Call, Client, Daemon, DaemonConfig, ErrorKind, NewTask, Request, Response, Role, Status, Store, TaskError,
    is_daemon_running, kind_of, task_error,
};
use tempfile::TempDir;

fn setup_store() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().unwrap();
    let root = temp_dir.path().to_path_buf();
    let mut store = Store::init(&root).unwrap();
    store.add_user("boss", Role::Manager).unwrap();
    store.add_user("alice", Role::User).unwrap();
    (temp_dir, root)
}

fn spawn_daemon(root: &Path) -> thread::JoinHandle<()> {
    let daemon_root = root.to_path_buf();
    let handle = thread::spawn(move || {
        let mut daemon = Daemon::new(DaemonConfig::new(&daemon_root)).unwrap();
        // One worker: a connection that parks a thread would stall everything.
        let rt = tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .enable_all()
            .build()
            .unwrap();
        rt.block_on(daemon.run()).unwrap();
    });

    for _ in 0..100 {
        if is_daemon_running(root) {
            return handle;
        }
        thread::sleep(Duration::from_millis(20));
    }
    panic!("daemon did not come up");
}

#[test]
fn test_daemon_round_trip() {
    let (_temp_dir, root) = setup_store();
    let handle = spawn_daemon(&root);

    let mut boss = Client::connect(&root, false).unwrap().acting_as("boss");
    boss.ping().unwrap();

    let a = boss.create(NewTask::new("A")).unwrap();
    let b = boss.create(NewTask::new("B").depends_on([a.id])).unwrap();

    // Cycle comes back typed, with its path.
    let err = boss.add_dependencies(a.id, vec![b.id]).unwrap_err();
    assert_eq!(
        task_error(&err),
        Some(&TaskError::Cycle {
            task_id: a.id,
            dependency_id: b.id,
            path: vec![b.id, a.id],
        })
    );

    let err = boss.set_status(b.id, Status::Completed).unwrap_err();
    assert_eq!(kind_of(&err), ErrorKind::Blocked);

    assert_eq!(boss.check_cycle(a.id, b.id).unwrap(), Some(vec![b.id, a.id]));

    let report = boss.dependency_report(a.id).unwrap();
    assert_eq!(
        report.forbidden.iter().map(|c| c.id).collect::<Vec<_>>(),
        vec![a.id, b.id]
    );

    boss.set_status(a.id, Status::Completed).unwrap();
    let done = boss.set_status(b.id, Status::Completed).unwrap();
    assert_eq!(done.status, Status::Completed);

    let details = boss.get(b.id).unwrap();
    assert_eq!(details.dependencies[0].id, a.id);

    boss.shutdown().unwrap();
    handle.join().unwrap();

    assert!(!DaemonConfig::new(&root).socket_path().exists());
    assert!(!is_daemon_running(&root));
}

#[test]
fn test_daemon_enforces_roles() {
    let (_temp_dir, root) = setup_store();
    let handle = spawn_daemon(&root);

    {
        let mut alice = Client::connect(&root, false).unwrap().acting_as("alice");
        let err = alice.create(NewTask::new("Mine")).unwrap_err();
        assert_eq!(kind_of(&err), ErrorKind::Forbidden);
        assert!(alice.list(Default::default()).unwrap().is_empty());

        let mut stranger = Client::connect(&root, false).unwrap().acting_as("mallory");
        let err = stranger.ready().unwrap_err();
        assert_eq!(task_error(&err), Some(&TaskError::UnknownUser("mallory".to_string())));

        // Raw calls see the error variant itself.
        let response = stranger
            .send_call(&Call::new("alice", Request::DeleteTask { id: 1 }))
            .unwrap();
        assert!(matches!(response, Response::Forbidden { .. }));
    }

    let mut admin = Client::connect(&root, false).unwrap();
    admin.shutdown().unwrap();
    handle.join().unwrap();
}

#[test]
fn test_idle_connections_do_not_stall_daemon() {
    let (_temp_dir, root) = setup_store();
    let handle = spawn_daemon(&root);

    let idle: Vec<Client> = (0..3).map(|_| Client::connect(&root, false).unwrap()).collect();

    let mut boss = Client::connect(&root, false).unwrap().acting_as("boss");
    let start = Instant::now();
    boss.ping().unwrap();
    let task = boss.create(NewTask::new("Still served")).unwrap();
    assert_eq!(boss.get(task.id).unwrap().task.title, "Still served");
    assert!(start.elapsed() < Duration::from_secs(5));

    // Open connections do not hold up shutdown either.
    boss.shutdown().unwrap();
    handle.join().unwrap();
    drop(idle);
}
