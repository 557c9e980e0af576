//! Façade tests: merged status, settings, and job operations against an
//! in-memory device.

use grblkit_client::{Grbl, MachineState};
use grblkit_core::gcode::{Line, Word};
use grblkit_core::ClientError;
use tokio::io::{AsyncReadExt, AsyncWriteExt, DuplexStream};

fn connect() -> (Grbl, DuplexStream) {
    let (transport, device) = tokio::io::duplex(4096);
    (Grbl::connect(transport), device)
}

fn line(words: &[(char, f64)]) -> Line {
    words.iter().map(|&(l, v)| Word::new(l, v)).collect()
}

async fn read_string(device: &mut DuplexStream, n: usize) -> String {
    let mut buf = vec![0u8; n];
    device.read_exact(&mut buf).await.unwrap();
    String::from_utf8(buf).unwrap()
}

#[tokio::test]
async fn test_status_derives_work_position_from_offset() {
    let (grbl, mut device) = connect();

    tokio::spawn(async move {
        let mut query = [0u8; 1];
        device.read_exact(&mut query).await.unwrap();
        assert_eq!(query[0], b'?');
        device
            .write_all(b"<Idle|MPos:1.000,2.000,3.000|WCO:0.000,0.000,1.000>\r\n")
            .await
            .unwrap();
        // keep the device alive until the test is done
        let _ = device.read(&mut query).await;
    });

    let status = grbl.status().await.unwrap();
    assert_eq!(status.state, MachineState::Idle);
    assert_eq!(status.mpos, Some([1.0, 2.0, 3.0]));
    assert_eq!(status.wpos, Some([1.0, 2.0, 2.0]));
}

#[tokio::test]
async fn test_status_without_offset_leaves_machine_position_unset() {
    let (grbl, mut device) = connect();

    tokio::spawn(async move {
        let mut query = [0u8; 1];
        device.read_exact(&mut query).await.unwrap();
        device
            .write_all(b"<Run|WPos:5.0,5.0,5.0|Bf:10,20|FS:500,1000>\r\n")
            .await
            .unwrap();
        let _ = device.read(&mut query).await;
    });

    let status = grbl.status().await.unwrap();
    assert_eq!(status.state, MachineState::Run);
    assert_eq!(status.wpos, Some([5.0, 5.0, 5.0]));
    assert_eq!(status.mpos, None);
    assert_eq!(status.block_buffer_available, 10);
    assert_eq!(status.serial_buffer_available, 20);
    assert_eq!(status.feed_speed, 500.0);
    assert_eq!(status.spindle_speed, 1000.0);
}

#[tokio::test]
async fn test_machine_position_derived_once_offset_known() {
    let (grbl, mut device) = connect();

    tokio::spawn(async move {
        let mut query = [0u8; 1];
        device.read_exact(&mut query).await.unwrap();
        device
            .write_all(b"<Idle|WPos:5.000,5.000,5.000|WCO:1.000,0.000,0.000>\r\n")
            .await
            .unwrap();
        let _ = device.read(&mut query).await;
    });

    let status = grbl.status().await.unwrap();
    assert_eq!(status.mpos, Some([6.0, 5.0, 5.0]));
}

#[tokio::test]
async fn test_settings_snapshot_after_dump() {
    let (grbl, mut device) = connect();

    tokio::spawn(async move {
        assert_eq!(read_string(&mut device, 3).await, "$$\n");
        device
            .write_all(b"$0=10\r\n$110=500.000\r\n$120=10.000\r\nok\r\n")
            .await
            .unwrap();
        let mut byte = [0u8; 1];
        let _ = device.read(&mut byte).await;
    });

    let settings = grbl.settings().await.unwrap();
    assert_eq!(settings.step_pulse, std::time::Duration::from_micros(10));
    assert_eq!(settings.max_rate.x.mm_per_min(), 500.0);
    assert_eq!(settings.max_acceleration.x.mm_per_sec2(), 10.0);
}

#[tokio::test]
async fn test_run_reports_each_line() {
    let (grbl, mut device) = connect();
    let program = vec![line(&[('G', 0.0), ('X', 1.0)]), line(&[('G', 0.0), ('X', 2.0)])];

    let device_task = tokio::spawn(async move {
        assert_eq!(read_string(&mut device, 10).await, "G0X1\nG0X2\n");
        device.write_all(b"ok\r\nok\r\n").await.unwrap();
        device
    });

    let mut results = grbl.run(&program);
    let first = results.recv().await.unwrap();
    assert_eq!(first.line, 0);
    assert!(first.result.is_ok());
    let second = results.recv().await.unwrap();
    assert_eq!(second.line, 1);
    assert!(second.result.is_ok());
    assert!(results.recv().await.is_none());

    device_task.await.unwrap();
}

#[tokio::test]
async fn test_check_filters_scaffolding_responses() {
    let (grbl, mut device) = connect();
    let program = vec![line(&[('G', 0.0), ('X', 1.0)]), line(&[('G', 1.0), ('X', 2.0)])];

    let device_task = tokio::spawn(async move {
        let wire = read_string(&mut device, 26).await;
        assert_eq!(wire, "$C\nG92X0Y0Z0\nG0X1\nG1X2\n$C\n");
        // toggle, shim, first line fails, second passes, toggle
        device
            .write_all(b"ok\r\nok\r\nerror:33\r\nok\r\nok\r\n")
            .await
            .unwrap();
        device
    });

    let mut results = grbl.check(&program);
    let first = results.recv().await.unwrap();
    assert_eq!(first.line, 0);
    match first.result {
        Err(ClientError::Command { response }) => assert_eq!(response, "error:33"),
        other => panic!("expected command error, got {other:?}"),
    }
    let second = results.recv().await.unwrap();
    assert_eq!(second.line, 1);
    assert!(second.result.is_ok());
    assert!(results.recv().await.is_none());

    device_task.await.unwrap();
}

#[tokio::test]
async fn test_jog_renders_jog_command() {
    let (grbl, mut device) = connect();

    grbl.jog(&line(&[('G', 91.0), ('X', 1.0), ('F', 500.0)]));

    assert_eq!(read_string(&mut device, 13).await, "$J=G91X1F500\n");
    device.write_all(b"ok\r\n").await.unwrap();
}

#[tokio::test]
async fn test_home_waits_for_acknowledgment() {
    let (grbl, mut device) = connect();

    let device_task = tokio::spawn(async move {
        assert_eq!(read_string(&mut device, 3).await, "$H\n");
        device.write_all(b"ok\r\n").await.unwrap();
        device
    });

    grbl.home().await.unwrap();
    device_task.await.unwrap();
}

#[tokio::test]
async fn test_unlock() {
    let (grbl, mut device) = connect();

    let device_task = tokio::spawn(async move {
        assert_eq!(read_string(&mut device, 3).await, "$X\n");
        device.write_all(b"ok\r\n").await.unwrap();
        device
    });

    grbl.unlock().await.unwrap();
    device_task.await.unwrap();
}

#[tokio::test]
async fn test_check_mode_message_updates_state() {
    let (grbl, mut device) = connect();
    let mut statuses = grbl.subscribe();

    device.write_all(b"[MSG:Enabled]\r\n").await.unwrap();
    statuses.changed().await.unwrap();
    assert_eq!(statuses.borrow().state, MachineState::Check);

    device.write_all(b"[MSG:Disabled]\r\n").await.unwrap();
    statuses.changed().await.unwrap();
    assert_eq!(statuses.borrow().state, MachineState::Idle);
}
