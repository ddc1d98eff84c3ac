//! Session tests against a scripted controller on a loopback socket:
//! correlation, framing across packet boundaries, timeouts, validation and
//! the immediate stop path.

use std::time::Duration;

use serde_json::Value;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};
use tokio::time::sleep;

use hexarm::drivers::ArmDriver;
use hexarm::packets::{Command, FrameDecoder};
use hexarm::{ArmDriverConfig, ArmError, ConnectionState, JointChain, RobotArm, RobotMode};

async fn bind() -> (TcpListener, ArmDriverConfig) {
    // Opt-in frame logging: RUST_LOG=hexarm=debug cargo test
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let mut config = ArmDriverConfig::new("127.0.0.1", port);
    config.retry_delay = Duration::from_millis(10);
    config.response_timeout = Duration::from_millis(500);
    (listener, config)
}

async fn read_frame(socket: &mut TcpStream, decoder: &mut FrameDecoder) -> String {
    let mut buf = [0u8; 2048];
    loop {
        if let Some(line) = decoder.next_frame() {
            return line;
        }
        let n = socket.read(&mut buf).await.unwrap();
        assert!(n > 0, "client closed mid-script");
        decoder.extend(&buf[..n]);
    }
}

fn command_name(line: &str) -> String {
    let value: Value = serde_json::from_str(line).unwrap();
    value["command"].as_str().unwrap().to_string()
}

fn ack(name: &str) -> String {
    format!("{{\"command\":\"{name}\",\"data\":\"true\"}}\r\n")
}

/// Controller that answers every command in arrival order. Getters receive
/// fixed payloads; the joint read-back deliberately uses the `return` key
/// some firmware revisions emit.
fn spawn_echo_controller(listener: TcpListener) {
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut decoder = FrameDecoder::new();
        loop {
            let line = read_frame(&mut socket, &mut decoder).await;
            let name = command_name(&line);
            let reply = match name.as_str() {
                "get_joint_angle_all" => format!(
                    "{{\"return\":\"{name}\",\"data\":[1.0,2.0,3.0,4.0,5.0,6.0]}}\r\n"
                ),
                "get_robot_mode" => format!("{{\"command\":\"{name}\",\"data\":\"SEQ\"}}\r\n"),
                "get_coordinate" => format!(
                    "{{\"command\":\"{name}\",\"data\":[0.1,0.2,0.3,10.0,20.0,30.0]}}\r\n"
                ),
                _ => ack(&name),
            };
            socket.write_all(reply.as_bytes()).await.unwrap();
        }
    });
}

#[tokio::test]
async fn sequential_calls_round_trip_in_order() {
    let (listener, config) = bind().await;
    spawn_echo_controller(listener);

    let arm = RobotArm::connect(config, JointChain::default()).await.unwrap();
    assert!(arm.initialize().await.unwrap().succeeded());
    assert!(arm
        .set_joint_angle_all_time(50, [10.0, 20.0, 30.0, 40.0, -30.0, 60.0])
        .await
        .unwrap()
        .succeeded());
    assert!(arm.set_end_tool(true).await.unwrap().succeeded());

    // Decoded through the `return` alias key.
    let angles = arm.get_joint_angle_all().await.unwrap();
    assert_eq!(angles, [1.0, 2.0, 3.0, 4.0, 5.0, 6.0]);

    let pose = arm.get_coordinate().await.unwrap();
    assert_eq!(pose.to_array(), [0.1, 0.2, 0.3, 10.0, 20.0, 30.0]);

    arm.shutdown().await;
}

#[tokio::test]
async fn concurrent_calls_correlate_when_answered_in_reverse() {
    let (listener, config) = bind().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut decoder = FrameDecoder::new();
        let first = command_name(&read_frame(&mut socket, &mut decoder).await);
        let second = command_name(&read_frame(&mut socket, &mut decoder).await);
        // Answer out of order, both frames in a single write.
        let batch = format!(
            "{{\"command\":\"{second}\",\"data\":\"SEQ\"}}\r\n{{\"command\":\"{first}\",\"data\":[1.0,2.0,3.0,4.0,5.0,6.0]}}\r\n"
        );
        socket.write_all(batch.as_bytes()).await.unwrap();
        (first, second)
    });

    let driver = ArmDriver::connect(config).await.unwrap();
    let (angles, mode) = tokio::join!(
        driver.call(Command::GetJointAngleAll),
        driver.call(Command::GetMode)
    );

    let (first, second) = server.await.unwrap();
    assert_eq!(first, "get_joint_angle_all");
    assert_eq!(second, "get_robot_mode");
    assert_eq!(angles.unwrap().data, serde_json::json!([1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
    assert_eq!(mode.unwrap().data, serde_json::json!("SEQ"));

    driver.shutdown().await;
}

#[tokio::test]
async fn response_split_across_writes_is_reassembled() {
    let (listener, config) = bind().await;
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut decoder = FrameDecoder::new();
        let _ = read_frame(&mut socket, &mut decoder).await;
        let reply = "{\"command\":\"get_robot_mode\",\"data\":\"INT\"}\r\n";
        for chunk in reply.as_bytes().chunks(7) {
            socket.write_all(chunk).await.unwrap();
            socket.flush().await.unwrap();
            sleep(Duration::from_millis(5)).await;
        }
    });

    let arm = RobotArm::connect(config, JointChain::default()).await.unwrap();
    assert_eq!(arm.get_robot_mode().await.unwrap(), RobotMode::Int);
    arm.shutdown().await;
}

#[tokio::test]
async fn silent_controller_times_out_the_wait() {
    let (listener, mut config) = bind().await;
    config.response_timeout = Duration::from_millis(100);
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        // Read but never answer.
        let mut buf = [0u8; 2048];
        while socket.read(&mut buf).await.unwrap_or(0) > 0 {}
    });

    let driver = ArmDriver::connect(config).await.unwrap();
    match driver.call(Command::GetMode).await {
        Err(ArmError::CorrelationTimeout { command, .. }) => {
            assert_eq!(command, "get_robot_mode");
        }
        other => panic!("expected a correlation timeout, got {other:?}"),
    }
    driver.shutdown().await;
}

#[tokio::test]
async fn controller_eof_fails_the_session() {
    let (listener, config) = bind().await;
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut decoder = FrameDecoder::new();
        let _ = read_frame(&mut socket, &mut decoder).await;
        // Hang up without answering.
    });

    let driver = ArmDriver::connect(config).await.unwrap();
    match driver.call(Command::GetMode).await {
        Err(ArmError::NotConnected(ConnectionState::Failed)) => {}
        other => panic!("expected the in-flight call to fail, got {other:?}"),
    }
    assert_eq!(driver.state().await, ConnectionState::Failed);

    // Later calls fail fast instead of touching the dead socket.
    assert!(matches!(
        driver.call(Command::GetJointAngleAll).await,
        Err(ArmError::NotConnected(ConnectionState::Failed))
    ));
}

#[tokio::test]
async fn malformed_frame_does_not_kill_the_session() {
    let (listener, config) = bind().await;
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut decoder = FrameDecoder::new();
        let name = command_name(&read_frame(&mut socket, &mut decoder).await);
        // Garbage line first, then the real answer.
        socket.write_all(b"!!! not json !!!\r\n").await.unwrap();
        socket
            .write_all(format!("{{\"command\":\"{name}\",\"data\":\"SEQ\"}}\r\n").as_bytes())
            .await
            .unwrap();
    });

    let arm = RobotArm::connect(config, JointChain::default()).await.unwrap();
    assert_eq!(arm.get_robot_mode().await.unwrap(), RobotMode::Seq);
    assert_eq!(arm.connection_state().await, ConnectionState::Connected);
    arm.shutdown().await;
}

#[tokio::test]
async fn invalid_arguments_never_reach_the_wire() {
    let (listener, config) = bind().await;
    let server = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut decoder = FrameDecoder::new();
        let name = command_name(&read_frame(&mut socket, &mut decoder).await);
        socket
            .write_all(format!("{{\"command\":\"{name}\",\"data\":\"SEQ\"}}\r\n").as_bytes())
            .await
            .unwrap();
        name
    });

    let arm = RobotArm::connect(config, JointChain::default()).await.unwrap();
    assert!(matches!(arm.set_time_delay(5000).await, Err(ArmError::Validation(_))));
    assert!(matches!(
        arm.set_joint_angle(7, 50, 0.0).await,
        Err(ArmError::Validation(_))
    ));
    assert!(matches!(
        arm.set_joint_angle(1, 0, 0.0).await,
        Err(ArmError::Validation(_))
    ));
    assert!(matches!(
        arm.set_joint_angle(2, 50, 90.0).await,
        Err(ArmError::Validation(_))
    ));
    assert!(matches!(arm.set_io(9, true).await, Err(ArmError::Validation(_))));

    // The first frame the controller ever sees is the valid call below.
    assert_eq!(arm.get_robot_mode().await.unwrap(), RobotMode::Seq);
    assert_eq!(server.await.unwrap(), "get_robot_mode");
    arm.shutdown().await;
}

#[tokio::test]
async fn time_delay_is_rejected_outside_seq_mode() {
    let (listener, config) = bind().await;
    spawn_echo_controller(listener);

    let arm = RobotArm::connect(config, JointChain::default()).await.unwrap();
    assert!(arm.set_robot_mode(RobotMode::Int).await.unwrap().succeeded());
    assert!(matches!(arm.set_time_delay(100).await, Err(ArmError::Validation(_))));

    assert!(arm.set_robot_mode(RobotMode::Seq).await.unwrap().succeeded());
    assert!(arm.set_time_delay(100).await.unwrap().succeeded());
    arm.shutdown().await;
}

#[tokio::test]
async fn stop_commands_round_trip_on_the_immediate_path() {
    let (listener, config) = bind().await;
    spawn_echo_controller(listener);

    let arm = RobotArm::connect(config, JointChain::default()).await.unwrap();
    assert!(arm.stop().await.unwrap().succeeded());
    assert!(arm.emergency_stop().await.unwrap().succeeded());
    arm.shutdown().await;
}

#[tokio::test]
async fn oneshot_call_opens_sends_and_closes() {
    let (listener, config) = bind().await;
    tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.unwrap();
        let mut decoder = FrameDecoder::new();
        let name = command_name(&read_frame(&mut socket, &mut decoder).await);
        socket.write_all(ack(&name).as_bytes()).await.unwrap();
    });

    let frame = ArmDriver::oneshot_call(&config, Command::Stop).await.unwrap();
    assert_eq!(frame.command, "set_joint_stop");
    assert_eq!(frame.data, serde_json::json!("true"));
}

#[tokio::test]
async fn calls_fail_fast_after_shutdown() {
    let (listener, config) = bind().await;
    spawn_echo_controller(listener);

    let arm = RobotArm::connect(config, JointChain::default()).await.unwrap();
    arm.shutdown().await;
    assert_eq!(arm.connection_state().await, ConnectionState::Disconnected);
    assert!(matches!(
        arm.get_robot_mode().await,
        Err(ArmError::NotConnected(ConnectionState::Disconnected))
    ));
}

#[tokio::test]
async fn connect_reports_exhausted_attempts() {
    // Grab a free port and close it again so nothing is listening there.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);

    let mut config = ArmDriverConfig::new("127.0.0.1", port);
    config.connect_retries = 2;
    config.retry_delay = Duration::from_millis(10);

    match ArmDriver::connect(config).await {
        Err(ArmError::Connection { attempts, .. }) => assert_eq!(attempts, 2),
        other => panic!("expected a connection error, got {other:?}"),
    }
}
