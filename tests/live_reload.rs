use std::{net::SocketAddr, time::Duration};

use futures_util::{SinkExt, StreamExt};
use livehttpd::{Config, Error, Hub, Server, RELOAD_SIGNAL};
use tokio::{net::TcpStream, sync::oneshot, task::JoinHandle};
use tokio_tungstenite::{
    connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream,
};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

const WAIT: Duration = Duration::from_secs(5);

struct Running {
    addr: SocketAddr,
    hub: Hub,
    stop: oneshot::Sender<()>,
    task: JoinHandle<Result<(), Error>>,
    dir: tempfile::TempDir,
}

async fn start() -> Running {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("index.html"), "<p>Hi</p>").unwrap();

    let config = Config {
        port: 0,
        debounce: Duration::from_millis(20),
        ..Config::new(dir.path())
    };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    let hub = server.hub();
    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async {
        stopped.await.ok();
    }));

    Running {
        addr,
        hub,
        stop,
        task,
        dir,
    }
}

async fn connect(addr: SocketAddr) -> Socket {
    let (socket, _) = connect_async(format!("ws://{addr}/")).await.unwrap();
    socket
}

async fn wait_for_clients(hub: &Hub, count: usize) {
    tokio::time::timeout(WAIT, async {
        while hub.len() != count {
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("clients did not reach the expected count");
}

async fn next_text(socket: &mut Socket) -> String {
    let message = tokio::time::timeout(WAIT, socket.next())
        .await
        .expect("no message received")
        .unwrap()
        .unwrap();
    message.to_text().unwrap().to_owned()
}

async fn assert_silent(socket: &mut Socket) {
    let next = tokio::time::timeout(Duration::from_millis(200), socket.next()).await;
    assert!(next.is_err(), "unexpected message: {next:?}");
}

#[tokio::test]
async fn every_connected_client_receives_one_signal() {
    let server = start().await;
    let mut sockets = Vec::new();
    for _ in 0..3 {
        sockets.push(connect(server.addr).await);
    }
    wait_for_clients(&server.hub, 3).await;

    assert_eq!(server.hub.broadcast(), 3);

    for socket in &mut sockets {
        assert_eq!(next_text(socket).await, RELOAD_SIGNAL);
        assert_silent(socket).await;
    }
}

#[tokio::test]
async fn departed_clients_do_not_disturb_the_others() {
    let server = start().await;
    let mut staying = connect(server.addr).await;
    let leaving = connect(server.addr).await;
    wait_for_clients(&server.hub, 2).await;

    drop(leaving);
    server.hub.broadcast();

    assert_eq!(next_text(&mut staying).await, RELOAD_SIGNAL);
    wait_for_clients(&server.hub, 1).await;
}

#[tokio::test]
async fn client_messages_are_ignored() {
    let server = start().await;
    let mut socket = connect(server.addr).await;
    wait_for_clients(&server.hub, 1).await;

    socket.send(Message::text("hello".to_owned())).await.unwrap();
    assert_silent(&mut socket).await;
    assert_eq!(server.hub.len(), 1);

    server.hub.broadcast();
    assert_eq!(next_text(&mut socket).await, RELOAD_SIGNAL);
}

#[tokio::test]
async fn closing_the_socket_unregisters_the_client() {
    let server = start().await;
    let mut socket = connect(server.addr).await;
    wait_for_clients(&server.hub, 1).await;

    socket.close(None).await.unwrap();

    wait_for_clients(&server.hub, 0).await;
}

#[tokio::test]
async fn file_changes_reload_connected_clients() {
    let server = start().await;
    let mut first = connect(server.addr).await;
    let mut second = connect(server.addr).await;
    wait_for_clients(&server.hub, 2).await;

    let root = server.dir.path().to_path_buf();
    std::fs::write(root.join("index.html"), "<p>Changed</p>").unwrap();
    std::fs::write(root.join("style.css"), "p {}").unwrap();

    assert_eq!(next_text(&mut first).await, RELOAD_SIGNAL);
    assert_eq!(next_text(&mut second).await, RELOAD_SIGNAL);
}

#[tokio::test]
async fn shutdown_closes_every_channel() {
    let server = start().await;
    let mut socket = connect(server.addr).await;
    wait_for_clients(&server.hub, 1).await;

    server.stop.send(()).unwrap();

    let closed = tokio::time::timeout(WAIT, async {
        loop {
            match socket.next().await {
                Some(Ok(Message::Close(_))) | None | Some(Err(_)) => break,
                Some(Ok(_)) => {}
            }
        }
    })
    .await;
    assert!(closed.is_ok());
    assert!(server.hub.is_empty());

    let result = tokio::time::timeout(WAIT, server.task).await.unwrap().unwrap();
    assert!(result.is_ok());
}

#[tokio::test]
async fn page_and_channel_share_the_port() {
    let server = start().await;

    let mut stream = TcpStream::connect(server.addr).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(
        &mut stream,
        b"GET / HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await
    .unwrap();
    let mut response = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut response)
        .await
        .unwrap();
    let response = String::from_utf8(response).unwrap();

    assert!(response.starts_with("HTTP/1.1 200 OK"));
    assert!(response.contains("<p>Hi</p>"));
    assert!(response.contains(&format!(":{}/", server.addr.port())));

    let mut socket = connect(server.addr).await;
    wait_for_clients(&server.hub, 1).await;
    server.hub.broadcast();
    assert_eq!(next_text(&mut socket).await, RELOAD_SIGNAL);
}

#[tokio::test]
async fn port_in_use_fails_to_start() {
    let taken = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        port: taken.local_addr().unwrap().port(),
        ..Config::new(dir.path())
    };

    let result = Server::bind(config).await;

    assert!(matches!(result, Err(Error::ListenFailure { .. })));
}

#[tokio::test]
async fn missing_root_fails_to_start() {
    let dir = tempfile::tempdir().unwrap();

    let result = Server::bind(Config::new(dir.path().join("missing"))).await;

    assert!(matches!(result, Err(Error::InvalidRoot { .. })));
}

#[tokio::test]
async fn unwatchable_root_keeps_serving() {
    let dir = tempfile::tempdir().unwrap();
    let root = dir.path().join("site");
    std::fs::create_dir(&root).unwrap();
    let config = Config {
        port: 0,
        ..Config::new(&root)
    };
    let server = Server::bind(config).await.unwrap();
    let addr = server.local_addr().unwrap();
    std::fs::remove_dir(&root).unwrap();

    let (stop, stopped) = oneshot::channel::<()>();
    let task = tokio::spawn(server.run(async {
        stopped.await.ok();
    }));

    let mut stream = TcpStream::connect(addr).await.unwrap();
    tokio::io::AsyncWriteExt::write_all(
        &mut stream,
        b"GET /x HTTP/1.1\r\nHost: localhost\r\nConnection: close\r\n\r\n",
    )
    .await
    .unwrap();
    let mut response = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut stream, &mut response)
        .await
        .unwrap();
    let response = String::from_utf8(response).unwrap();
    assert!(response.starts_with("HTTP/1.1 404 Not Found"), "{response}");
    assert!(response.contains(r#""code":"NOT-FOUND""#));

    stop.send(()).unwrap();
    let result = tokio::time::timeout(WAIT, task).await.unwrap().unwrap();
    assert!(result.is_ok());
}
