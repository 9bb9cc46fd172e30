//! # Integration Tests
//!
//! End-to-end scenarios across the workspace crates, run against the mock
//! transport and mock GPIO lines (no server or hardware required).

#[cfg(test)]
mod contract_tests {
    #[test]
    fn test_default_config_is_valid() {
        let config = contracts::TimerConfig::default();
        config_loader::ConfigLoader::validate(&config).unwrap();
        assert_eq!(config.gpio.lanes.len(), contracts::LANE_COUNT);
    }
}

#[cfg(test)]
mod e2e_tests {
    use std::io::{self, Write};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    use contracts::{
        EdgeLine, GpioConfig, IdentityConfig, LogSink, PinConfig, RaceConfig, ServerConfig,
    };
    use derbynet::{
        DerbyNetError, LogForwarder, MockServer, MockTransport, ProtocolSession, SessionPhase,
    };
    use gpio_timer::{ControllerConfig, HeatOutcome, RaceController, RaceStats, TERMINATION_REASON};
    use observability::LogRouter;
    use sensors::{LaneArray, MockLine, MockLineProvider};
    use tokio::task::JoinHandle;

    const HEAT_READY_14: &str = r#"<action-response>
  <heat-ready lane-mask="14" class="Webelos" round="2" roundid="9" heat="3"/>
</action-response>"#;
    const HEAT_READY_15: &str = r#"<action-response>
  <heat-ready lane-mask="15" class="Tigers" round="1" roundid="4" heat="1"/>
</action-response>"#;
    const ABORT: &str = "<action-response><abort/></action-response>";

    struct Track {
        session: Arc<ProtocolSession<MockTransport>>,
        server: MockServer,
        provider: Arc<MockLineProvider>,
        gpio: GpioConfig,
    }

    impl Track {
        async fn new() -> (Self, LaneArray) {
            let (transport, server) = MockTransport::new();
            let session =
                ProtocolSession::new(transport, &ServerConfig::default(), IdentityConfig::default());
            session.authenticate().await.unwrap();
            session.send_hello().await.unwrap();
            session.send_identification("e2e").await.unwrap();

            let gpio = GpioConfig::default();
            let provider = Arc::new(MockLineProvider::new());
            let lanes = LaneArray::from_config(provider.as_ref(), &gpio, &race_config()).unwrap();
            let track = Self {
                session: Arc::new(session),
                server,
                provider,
                gpio,
            };
            (track, lanes)
        }

        fn start(&self, lanes: LaneArray, max_heats: Option<u64>) -> JoinHandle<RaceStats> {
            let controller = RaceController::new(
                Arc::clone(&self.session),
                lanes,
                ControllerConfig {
                    race: race_config(),
                    max_heats,
                },
            );
            tokio::spawn(controller.run())
        }

        fn line(&self, pin: &PinConfig) -> Arc<MockLine> {
            self.provider.get(pin).unwrap()
        }

        fn gate(&self) -> Arc<MockLine> {
            self.line(&self.gpio.gate)
        }

        fn lane(&self, lane: usize) -> Arc<MockLine> {
            self.line(&self.gpio.lanes[lane - 1])
        }

        async fn until_armed(&self) {
            let gate = self.gate();
            for _ in 0..400 {
                if gate.is_requested() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            panic!("sensors never armed");
        }

        fn finished_field(&self, key: &str) -> Option<String> {
            self.server
                .last_request("FINISHED")?
                .into_iter()
                .find(|(k, _)| k == key)
                .map(|(_, v)| v)
        }
    }

    fn race_config() -> RaceConfig {
        RaceConfig {
            heartbeat_interval_ms: 20,
            heat_wait_timeout_ms: 50,
            lane_deadline_ms: 250,
            debounce_us: 0,
            ..RaceConfig::default()
        }
    }

    fn has_five_decimals(value: &str) -> bool {
        value.parse::<f64>().is_ok() && value.split('.').nth(1).map(str::len) == Some(5)
    }

    /// heat-ready -> arm -> gate -> lanes -> FINISHED with the announced heat
    #[tokio::test]
    async fn test_e2e_heat_reported() {
        let (track, lanes) = Track::new().await;
        track.server.reply_to("HEARTBEAT", HEAT_READY_14);
        let task = track.start(lanes, Some(1));

        track.until_armed().await;
        track.gate().trigger();
        tokio::time::sleep(Duration::from_millis(20)).await;
        for lane in [2, 3, 4] {
            track.lane(lane).trigger();
            tokio::time::sleep(Duration::from_millis(5)).await;
        }

        let stats = task.await.unwrap();
        assert_eq!(stats.heats_finished(), 1);

        assert_eq!(track.finished_field("roundid").as_deref(), Some("9"));
        assert_eq!(track.finished_field("heat").as_deref(), Some("3"));
        // Lane 1 is outside the mask and never reported
        assert_eq!(track.finished_field("lane1"), None);
        for key in ["lane2", "lane3", "lane4"] {
            let value = track.finished_field(key).unwrap();
            assert!(has_five_decimals(&value), "{key}={value}");
        }
        let lane2: f64 = track.finished_field("lane2").unwrap().parse().unwrap();
        let lane4: f64 = track.finished_field("lane4").unwrap().parse().unwrap();
        assert!(lane2 < lane4);

        let messages = track.server.messages();
        let started = messages.iter().position(|m| m == "STARTED").unwrap();
        let finished = messages.iter().position(|m| m == "FINISHED").unwrap();
        assert!(started < finished);
        assert_eq!(track.session.phase().await, SessionPhase::Idle);
    }

    /// A lane that never fires is left out of FINISHED after the deadline
    #[tokio::test]
    async fn test_e2e_lane_never_fires() {
        let (track, lanes) = Track::new().await;
        track.server.reply_to("HEARTBEAT", HEAT_READY_15);
        let task = track.start(lanes, Some(1));

        track.until_armed().await;
        track.gate().trigger();
        tokio::time::sleep(Duration::from_millis(10)).await;
        for lane in [1, 2, 4] {
            track.lane(lane).trigger();
        }

        let stats = task.await.unwrap();
        let HeatOutcome::Finished(times) = stats.results[0].outcome else {
            panic!("unexpected outcome {:?}", stats.results[0].outcome);
        };
        assert_eq!(times[2], 0.0);
        assert_eq!(track.finished_field("lane3"), None);
        assert!(track.finished_field("lane1").is_some());
        assert_eq!(stats.race.lanes_missing, [0, 0, 1, 0]);
    }

    /// Abort while the lanes are running: no FINISHED, heat cleared
    #[tokio::test]
    async fn test_e2e_abort_mid_race() {
        let (track, lanes) = Track::new().await;
        track.server.reply_to("HEARTBEAT", HEAT_READY_15);
        let task = track.start(lanes, None);

        track.until_armed().await;
        track.gate().trigger();
        track.server.reply_to("HEARTBEAT", ABORT);
        tokio::time::sleep(Duration::from_millis(120)).await;

        let heat = track.session.current_heat().await.unwrap();
        assert_eq!(heat.heat_number, 0);
        assert_eq!(heat.round_id, 4);
        assert!(matches!(
            track.session.report_finished([1.0; 4]).await,
            Err(DerbyNetError::NoActiveHeat)
        ));

        track.session.terminate(TERMINATION_REASON).await.unwrap();
        let stats = task.await.unwrap();
        assert_eq!(stats.results[0].outcome, HeatOutcome::Aborted);
        assert!(track.server.messages().iter().any(|m| m == "STARTED"));
        assert!(!track.server.messages().iter().any(|m| m == "FINISHED"));
    }

    /// Ctrl-C path: pending heat cleared, MALFUNCTION sent once, loops stop
    #[tokio::test]
    async fn test_e2e_termination_handshake() {
        let (track, lanes) = Track::new().await;
        track.server.reply_to("HEARTBEAT", HEAT_READY_15);
        let task = track.start(lanes, None);
        track.until_armed().await;

        track.session.terminate(TERMINATION_REASON).await.unwrap();
        track.session.terminate(TERMINATION_REASON).await.unwrap();

        let stats = tokio::time::timeout(Duration::from_secs(2), task)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(stats.results[0].outcome, HeatOutcome::Aborted);

        let malfunctions: Vec<_> = track
            .server
            .requests()
            .into_iter()
            .filter(|fields| fields.iter().any(|(k, v)| k == "message" && v == "MALFUNCTION"))
            .collect();
        assert_eq!(malfunctions.len(), 1);
        assert!(malfunctions[0].contains(&("detectable".to_string(), "0".to_string())));
        assert!(malfunctions[0].contains(&("error".to_string(), TERMINATION_REASON.to_string())));
        assert_eq!(
            track.server.messages().last().map(String::as_str),
            Some("MALFUNCTION")
        );

        assert!(!track.session.wait_for_heat(Duration::from_millis(10)).await);
        assert!(matches!(
            track.session.send_heartbeat().await,
            Err(DerbyNetError::Terminating)
        ));
    }

    /// Shared in-memory local log output
    #[derive(Clone, Default)]
    struct Capture(Arc<Mutex<Vec<u8>>>);

    impl Write for Capture {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    impl Capture {
        fn text(&self) -> String {
            String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
        }
    }

    /// remote-log flips diversion; every record lands exactly once
    #[tokio::test]
    async fn test_e2e_remote_log_toggle() {
        let capture = Capture::default();
        let (router, log_rx) = LogRouter::with_local_writer(capture.clone());
        let router = router.keep_local(derbynet::FORWARDER_TARGET);

        let subscriber = tracing_subscriber::fmt()
            .with_writer(router.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (transport, server) = MockTransport::new();
        let log_sink: Arc<dyn LogSink> = Arc::new(router);
        let session = Arc::new(
            ProtocolSession::new(transport, &ServerConfig::default(), IdentityConfig::default())
                .with_log_sink(Arc::clone(&log_sink)),
        );
        let forwarder = LogForwarder::spawn(Arc::clone(&session), log_rx, log_sink);
        session.authenticate().await.unwrap();

        tracing::info!("record-a");
        server.reply_to(
            "HEARTBEAT",
            r#"<action-response><remote-log send="true"/></action-response>"#,
        );
        session.send_heartbeat().await.unwrap();
        assert!(session.is_log_diverted().await);
        tracing::info!("record-b");
        tracing::info!("record-c");

        server.reply_to(
            "HEARTBEAT",
            r#"<action-response><remote-log send="false"/></action-response>"#,
        );
        session.send_heartbeat().await.unwrap();
        tracing::info!("record-d");

        for _ in 0..200 {
            if server.logs().iter().any(|l| l.contains("record-c")) {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        let remote = server.logs().join("");
        let local = capture.text();

        for (record, remote_expected) in [
            ("record-a", false),
            ("record-b", true),
            ("record-c", true),
            ("record-d", false),
        ] {
            assert_eq!(remote.matches(record).count(), usize::from(remote_expected), "{record}");
            assert_eq!(local.matches(record).count(), usize::from(!remote_expected), "{record}");
        }
        let b = remote.find("record-b").unwrap();
        let c = remote.find("record-c").unwrap();
        assert!(b < c);

        assert_eq!(forwarder.metrics().failure_count(), 0);
        forwarder.shutdown(Duration::from_millis(50)).await;
    }

    /// A record the log endpoint refuses still reaches local output once
    #[tokio::test]
    async fn test_e2e_refused_log_record_kept_locally() {
        let capture = Capture::default();
        let (router, log_rx) = LogRouter::with_local_writer(capture.clone());
        let router = router.keep_local(derbynet::FORWARDER_TARGET);

        let subscriber = tracing_subscriber::fmt()
            .with_writer(router.clone())
            .with_ansi(false)
            .without_time()
            .with_max_level(tracing::Level::INFO)
            .finish();
        let _guard = tracing::subscriber::set_default(subscriber);

        let (transport, server) = MockTransport::new();
        let log_sink: Arc<dyn LogSink> = Arc::new(router);
        let session = Arc::new(
            ProtocolSession::new(transport, &ServerConfig::default(), IdentityConfig::default())
                .with_log_sink(Arc::clone(&log_sink)),
        );
        let forwarder = LogForwarder::spawn(Arc::clone(&session), log_rx, log_sink);
        session.authenticate().await.unwrap();

        server.reply_to(
            "HEARTBEAT",
            r#"<action-response><remote-log send="true"/></action-response>"#,
        );
        session.send_heartbeat().await.unwrap();
        server.fail_logs(true);
        tracing::info!("refused-record");

        for _ in 0..200 {
            if forwarder.metrics().failure_count() > 0 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        forwarder.shutdown(Duration::from_millis(50)).await;

        let remote = server.logs().join("");
        let local = capture.text();
        assert_eq!(remote.matches("refused-record").count(), 0);
        assert_eq!(local.matches("refused-record").count(), 1);
    }

    /// Config file -> lane array -> one simulated race
    #[tokio::test]
    async fn test_e2e_config_to_lane_array() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        write!(
            file,
            r#"
[race]
debounce_us = 0
lane_deadline_ms = 200

[gpio]
gate = {{ chip = "gpiochip0", line = 4 }}
lanes = [
    {{ chip = "gpiochip0", line = 5 }},
    {{ chip = "gpiochip0", line = 6 }},
    {{ chip = "gpiochip0", line = 7 }},
    {{ chip = "gpiochip0", line = 8 }},
]
"#
        )
        .unwrap();

        let config = config_loader::ConfigLoader::load_from_path(file.path()).unwrap();
        let provider = MockLineProvider::new();
        let mut lanes = LaneArray::from_config(&provider, &config.gpio, &config.race).unwrap();
        assert_eq!(provider.line_count(), 5);

        lanes.arm_gate().unwrap();
        lanes.arm_lanes().unwrap();
        provider.get(&PinConfig::new("gpiochip0", 4)).unwrap().trigger();
        provider.get(&PinConfig::new("gpiochip0", 6)).unwrap().trigger();

        let gate = lanes.wait_for_gate(Some(Duration::from_millis(50))).await;
        let deadline = std::time::Instant::now() + config.race.lane_deadline();
        let events = lanes.wait_for_lanes(deadline).await;
        let times = sensors::compute_elapsed(gate.as_ref(), &events);
        assert_eq!(times[0], 0.0);
        assert!(times[1] >= 0.0 && events[1].is_some());
        assert_eq!(times[2], 0.0);
    }
}
