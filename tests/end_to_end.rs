use std::time::Duration;

use firewatch::{Controller, ControllerConfig, MemorySink};
use firewatch_types::{Feed, FusionRecord};
use tokio::io::AsyncWriteExt;
use tokio::net::TcpStream;

const T: i64 = 1_760_000_000_000_000_000;
const MS: i64 = 1_000_000;

async fn wait_for(sink: &MemorySink, count: usize) -> Vec<FusionRecord> {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            if sink.len() >= count {
                return sink.records();
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for fusion records")
}

async fn wait_for_fusions(controller: &Controller, count: u64) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while controller.store().fusion_count() < count {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .expect("timed out waiting for fusions");
}

async fn send(stream: &mut TcpStream, line: &str) {
    stream.write_all(line.as_bytes()).await.unwrap();
    stream.write_all(b"\n").await.unwrap();
    stream.flush().await.unwrap();
}

async fn start() -> (Controller, MemorySink, TcpStream, TcpStream) {
    let sink = MemorySink::new();
    let controller =
        Controller::with_sinks(ControllerConfig::default(), vec![Box::new(sink.clone())]).unwrap();

    let thermal_addr = controller
        .start_listener(Feed::Thermal, "127.0.0.1:0")
        .await
        .unwrap();
    let imagery_addr = controller
        .start_listener(Feed::Imagery, "127.0.0.1:0")
        .await
        .unwrap();

    let thermal = TcpStream::connect(thermal_addr).await.unwrap();
    let imagery = TcpStream::connect(imagery_addr).await.unwrap();
    (controller, sink, thermal, imagery)
}

#[tokio::test]
async fn decision_sequence_over_tcp() {
    let (controller, sink, mut thermal, mut imagery) = start().await;

    // Garbage first; the connection must survive it.
    thermal.write_all(b"not json at all\n[1,2]\n").await.unwrap();
    send(
        &mut thermal,
        &format!(r#"{{"data": [[70.0, 71.0], [150.0, 69.0]], "tx_ns": {T}, "seq": 1}}"#),
    )
    .await;

    tokio::time::timeout(Duration::from_secs(5), async {
        while !controller.store().is_started(Feed::Thermal) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();
    assert!(sink.is_empty());

    // 1. Hot frame, fire label, 10 ms apart.
    send(
        &mut imagery,
        &format!(r#"{{"detections": [{{"label": "fire"}}], "tx_ns": {}, "seq": 1}}"#, T + 10 * MS),
    )
    .await;
    let records = wait_for(&sink, 1).await;
    assert!(records[0].decision);
    assert!((records[0].dt_s - 0.01).abs() < 1e-9);
    assert_eq!(records[0].thermal_shape, "2x2");

    // 2. Nothing detected.
    imagery.write_all(b"{broken\n").await.unwrap();
    send(
        &mut imagery,
        &format!(r#"{{"detections": [], "tx_ns": {}, "seq": 2}}"#, T + 10 * MS),
    )
    .await;
    let records = wait_for(&sink, 2).await;
    assert!(!records[1].decision);
    assert_eq!(records[1].num_detections, 0);

    // 3. Cool frame, then a fire label.
    send(&mut thermal, &format!(r#"{{"data": [50.0, 45.0], "tx_ns": {T}, "seq": 2}}"#)).await;
    wait_for(&sink, 3).await;
    send(
        &mut imagery,
        &format!(r#"{{"detections": [{{"label": "fire"}}], "tx_ns": {T}, "seq": 3}}"#),
    )
    .await;
    let records = wait_for(&sink, 4).await;
    assert!(!records[3].decision);
    assert_eq!(records[3].max_temp, 50.0);

    // 4. Hot again but five seconds out of step.
    send(
        &mut thermal,
        &format!(r#"{{"data": [500.0], "tx_ns": {}, "seq": 3}}"#, T + 5_000 * MS),
    )
    .await;
    let records = wait_for(&sink, 5).await;
    assert!(records[4].imagery_fire);
    assert!(records[4].max_temp > 100.0);
    assert!(records[4].dt_s > 2.0);
    assert!(!records[4].decision);

    let ids: Vec<u64> = records.iter().map(|r| r.fusion_id).collect();
    assert_eq!(ids, vec![1, 2, 3, 4, 5]);
    for record in &records {
        assert!(record.sync_gap_ms() >= 0.0);
    }
}

#[tokio::test]
async fn logs_on_disk_match() {
    let dir = tempfile::tempdir().unwrap();
    let config = ControllerConfig {
        latency_log: dir.path().join("latency_log.jsonl"),
        fusion_log: dir.path().join("fusion_log.csv"),
        ..Default::default()
    };
    let controller = Controller::new(config.clone()).unwrap();
    let thermal_addr = controller
        .start_listener(Feed::Thermal, "127.0.0.1:0")
        .await
        .unwrap();
    let imagery_addr = controller
        .start_listener(Feed::Imagery, "127.0.0.1:0")
        .await
        .unwrap();

    // Producers that omit every timing field still fuse.
    let mut thermal = TcpStream::connect(thermal_addr).await.unwrap();
    send(&mut thermal, r#"{"data": [120.0, 130.0]}"#).await;
    tokio::time::timeout(Duration::from_secs(5), async {
        while !controller.store().is_started(Feed::Thermal) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await
    .unwrap();

    let mut imagery = TcpStream::connect(imagery_addr).await.unwrap();
    send(&mut imagery, r#"{"detections": [{"label": "fire", "confidence": 0.9}]}"#).await;
    wait_for_fusions(&controller, 1).await;

    send(&mut thermal, r#"{"data": [[140.0], [90.0]], "seq": 2}"#).await;
    wait_for_fusions(&controller, 2).await;

    // An oddly typed confidence still replaces the fire frame.
    send(&mut imagery, r#"{"detections": [{"label": "smoke", "confidence": "high"}]}"#).await;
    wait_for_fusions(&controller, 3).await;
    controller.shutdown(firewatch::Shutdown::Interrupted);

    let jsonl = std::fs::read_to_string(&config.latency_log).unwrap();
    let records: Vec<FusionRecord> = jsonl
        .lines()
        .map(|line| serde_json::from_str(line).unwrap())
        .collect();
    let ids: Vec<u64> = records.iter().map(|r| r.fusion_id).collect();
    assert_eq!(ids, vec![1, 2, 3]);
    assert!(records[0].decision);
    assert_eq!(records[0].thermal_shape, "2x1");
    assert_eq!(records[0].thermal_net_ns, 0);
    assert!(records[1].decision);
    assert_eq!(records[1].thermal_shape, "2x1");
    assert!(!records[2].imagery_fire);
    assert!(!records[2].decision);

    let csv = std::fs::read_to_string(&config.fusion_log).unwrap();
    let rows: Vec<&str> = csv.lines().skip(1).collect();
    assert_eq!(rows.len(), 3);
    let csv_ids: Vec<u64> = rows
        .iter()
        .map(|row| row.split(',').next().unwrap().parse().unwrap())
        .collect();
    assert_eq!(csv_ids, vec![1, 2, 3]);
    assert!(rows[0].ends_with(",true,true,2x1,1"));
    assert!(rows[2].ends_with(",false,false,2x1,1"));
}
