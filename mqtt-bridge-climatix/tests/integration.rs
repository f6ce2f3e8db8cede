//! Integration tests for mqtt-bridge-climatix.
//!
//! A fake HMI serves layout HTML and read endpoint text through the real
//! parsers; everything published lands in a recording sink.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::mpsc;

use climatix_bridge_framework::testing::RecordingSink;
use climatix_bridge_framework::{IncomingMessage, PageStatus};
use climatix_common::TopicBuilder;

use mqtt_bridge_climatix::classifier::Profile;
use mqtt_bridge_climatix::commands::{CommandError, CommandHandler};
use mqtt_bridge_climatix::discovery::DiscoveryBuilder;
use mqtt_bridge_climatix::hmi::{HmiError, PageSource};
use mqtt_bridge_climatix::language::LanguageTable;
use mqtt_bridge_climatix::model::{Item, Page};
use mqtt_bridge_climatix::parser::{assemble_page, parse_layout, parse_read_values};
use mqtt_bridge_climatix::poller::{HmiPoller, PollerSettings};
use mqtt_bridge_climatix::publisher::EntityPublisher;
use mqtt_bridge_climatix::registry::CommandTargets;

const HOST: &str = "http://192.168.1.50";

const HOME_LAYOUT: &str = r#"<html><head><script>
function GFR() { SR("HMI00001Read.cgi"); }
</script></head><body>
<span id="o002" lg="1. 200">Home</span>
<div id="d1"><table><tr>
<td id="l1"><span lg="1. 100">Boiler state</span></td>
<td><span id="o038" it="e" e="Off*Heating*Burnout">0</span></td>
</tr></table></div>
<div id="d2"><table><tr>
<td id="l2">Power</td>
<td><span id="o044" it="v">0</span><span class="u">%</span></td>
</tr></table></div>
<div id="d3"><table><tr>
<td id="l3">Boiler temperature</td>
<td><span id="o075" it="v">0</span><span class="u">C</span></td>
</tr></table></div>
<div id="d4"><table><tr>
<td id="l4">Set point</td>
<td><span id="o090" it="v" mi="val:0x2302 0x100">0</span><span class="u">C</span></td>
</tr></table></div>
<div id="d5"><table><tr>
<td id="l5">Mode</td>
<td><span id="o040" it="e" mi="val:0x2310 0x100" e="Off*On">0</span></td>
</tr></table></div>
</body></html>"#;

const HOME_VALUES: &str = "o038,e,1|o044,v,\n 45 |o075,v,71.5|o082,v,55|o090,v,70|o040,e,0|";

const LANGUAGES: &str = r#"var languages1 = {
"1. 100": ["Stav kotle", "Boiler state"],
"1. 200": ["Domů", "Home"]
};"#;

/// HMI stand-in that parses canned documents and records writes.
#[derive(Default)]
struct FakeHmi {
    pages: HashMap<String, (String, String)>,
    languages: LanguageTable,
    writes: Mutex<Vec<(String, String, String)>>,
}

impl FakeHmi {
    fn new() -> Self {
        Self {
            languages: LanguageTable::parse(LANGUAGES),
            ..Self::default()
        }
    }

    fn with_page(mut self, page: &str, layout: &str, values: &str) -> Self {
        self.pages
            .insert(page.to_string(), (layout.to_string(), values.to_string()));
        self
    }

    fn writes(&self) -> Vec<(String, String, String)> {
        self.writes.lock().unwrap().clone()
    }
}

impl PageSource for FakeHmi {
    async fn fetch_page(&self, page: &str) -> Result<Page, HmiError> {
        let (layout, values) = self.pages.get(page).ok_or_else(|| HmiError::Status {
            url: format!("{}/{}", HOST, page),
            status: 404,
        })?;

        let layout = parse_layout(page, layout, &self.languages, 1);
        Ok(assemble_page(page, layout, &parse_read_values(values)))
    }

    async fn write_item(&self, page: &str, item: &Item, value: &str) -> Result<(), HmiError> {
        let write_index = item.write_index().ok_or_else(|| HmiError::NotWritable {
            page: page.to_string(),
            key: item.key.to_string(),
        })?;
        self.writes.lock().unwrap().push((
            page.to_string(),
            write_index.to_string(),
            value.to_string(),
        ));
        Ok(())
    }
}

struct Harness {
    hmi: Arc<FakeHmi>,
    sink: RecordingSink,
    targets: CommandTargets,
    topics: TopicBuilder,
    poller: HmiPoller<FakeHmi, RecordingSink>,
}

fn harness(hmi: FakeHmi, profile: Profile, pages: &[&str]) -> Harness {
    let hmi = Arc::new(hmi);
    let sink = RecordingSink::new();
    let targets = CommandTargets::new();
    let topics = TopicBuilder::new("benekov", HOST);
    let discovery = DiscoveryBuilder::new(
        "homeassistant",
        HOST,
        format!("Benekov @ {}", HOST),
        topics.clone(),
    );

    let poller = HmiPoller::new(
        hmi.clone(),
        EntityPublisher::new(sink.clone(), discovery, true),
        targets.clone(),
        hmi.languages.clone(),
        PollerSettings {
            pages: pages.iter().map(|p| p.to_string()).collect(),
            profile,
            interval: Duration::from_secs(30),
            health_topic: topics.health_topic(),
        },
    );

    Harness {
        hmi,
        sink,
        targets,
        topics,
        poller,
    }
}

fn discovery_json(sink: &RecordingSink, topic: &str) -> serde_json::Value {
    let message = sink
        .last_on(topic)
        .unwrap_or_else(|| panic!("no discovery on {topic}"));
    serde_json::from_slice(&message.payload).unwrap()
}

/// Monitor profile on a single page: only whitelisted items, all read-only.
#[tokio::test]
async fn test_monitor_profile_single_page() {
    let hmi = FakeHmi::new().with_page("HMI00001.cgi", HOME_LAYOUT, HOME_VALUES);
    let mut h = harness(hmi, Profile::Monitor, &["HMI00001.cgi"]);

    let summary = h.poller.poll_once().await;
    assert_eq!(summary.pages_ok, 1);
    assert_eq!(summary.pages_failed, 0);

    let state = |key: &str| {
        h.sink
            .last_on(&format!("benekov/http_192_168_1_50/HMI00001/{key}/state"))
            .map(|m| m.payload_str())
    };
    assert_eq!(state("o044").as_deref(), Some("45"));
    assert_eq!(state("o075").as_deref(), Some("71.5"));
    assert_eq!(state("o038").as_deref(), Some("Heating"));
    // Whitelisted but missing from the layout
    assert_eq!(state("o082").as_deref(), Some("55"));
    // Not whitelisted
    assert_eq!(state("o090"), None);
    assert_eq!(state("o040"), None);

    let power = discovery_json(
        &h.sink,
        "homeassistant/sensor/climatix_http_192_168_1_50/hmi00001_o044/config",
    );
    assert_eq!(power["name"], "Current power");
    assert_eq!(power["unit_of_measurement"], "%");
    assert_eq!(
        power["availability_topic"],
        "benekov/http_192_168_1_50/status"
    );
    assert_eq!(power["device"]["name"], "Benekov @ http://192.168.1.50");
    assert!(power.get("command_topic").is_none());

    let returns = discovery_json(
        &h.sink,
        "homeassistant/sensor/climatix_http_192_168_1_50/hmi00001_o082/config",
    );
    assert_eq!(returns["name"], "B7 Return temperature");
    assert_eq!(returns["unit_of_measurement"], "°C");

    assert!(h.sink.subscriptions().is_empty());
    assert!(h.targets.is_empty().await);
    assert!(
        h.sink
            .messages()
            .iter()
            .all(|m| !m.topic.starts_with("homeassistant/number")
                && !m.topic.starts_with("homeassistant/select"))
    );
}

/// All profile: writable items become controls and commands reach the HMI.
#[tokio::test]
async fn test_all_profile_commands() {
    let hmi = FakeHmi::new().with_page("HMI00001.cgi", HOME_LAYOUT, HOME_VALUES);
    let mut h = harness(hmi, Profile::All, &["HMI00001.cgi"]);

    h.poller.poll_once().await;

    let mode = discovery_json(
        &h.sink,
        "homeassistant/select/climatix_http_192_168_1_50/hmi00001_o040/config",
    );
    assert_eq!(mode["options"], serde_json::json!(["Off", "On"]));
    assert_eq!(
        mode["command_topic"],
        "benekov/http_192_168_1_50/HMI00001/o040/set"
    );

    let set_point = discovery_json(
        &h.sink,
        "homeassistant/number/climatix_http_192_168_1_50/hmi00001_o090/config",
    );
    assert_eq!(set_point["unit_of_measurement"], "C");

    // Enumerated but not writable
    discovery_json(
        &h.sink,
        "homeassistant/sensor/climatix_http_192_168_1_50/hmi00001_o038/config",
    );

    let mut subscriptions = h.sink.subscriptions();
    subscriptions.sort();
    assert_eq!(
        subscriptions,
        vec![
            "benekov/http_192_168_1_50/HMI00001/o040/set".to_string(),
            "benekov/http_192_168_1_50/HMI00001/o090/set".to_string(),
        ]
    );

    let (refresh_tx, mut refresh_rx) = mpsc::channel(4);
    let handler = CommandHandler::new(h.hmi.clone(), h.topics.clone(), h.targets.clone(), refresh_tx)
        .with_settle_delay(Duration::ZERO);

    let written = handler
        .handle("benekov/http_192_168_1_50/HMI00001/o040/set", "On")
        .await
        .unwrap();
    assert_eq!(written, "1");
    assert_eq!(refresh_rx.recv().await.as_deref(), Some("HMI00001.cgi"));

    handler
        .handle("benekov/http_192_168_1_50/HMI00001/o090/set", "72.5")
        .await
        .unwrap();

    assert!(matches!(
        handler
            .handle("benekov/http_192_168_1_50/HMI00001/o040/set", "Maybe")
            .await,
        Err(CommandError::InvalidOption { count: 2, .. })
    ));
    assert!(matches!(
        handler
            .handle("benekov/http_192_168_1_50/HMI00001/o044/set", "1")
            .await,
        Err(CommandError::UnknownTopic(_))
    ));

    assert_eq!(
        h.hmi.writes(),
        vec![
            (
                "HMI00001.cgi".to_string(),
                "val:0x2310 0x100".to_string(),
                "1".to_string()
            ),
            (
                "HMI00001.cgi".to_string(),
                "val:0x2302 0x100".to_string(),
                "72.5".to_string()
            ),
        ]
    );
}

/// Commands delivered through the MQTT inbound channel.
#[tokio::test]
async fn test_command_loop_from_incoming_messages() {
    let hmi = FakeHmi::new().with_page("HMI00001.cgi", HOME_LAYOUT, HOME_VALUES);
    let mut h = harness(hmi, Profile::All, &["HMI00001.cgi"]);
    h.poller.poll_once().await;

    let (incoming_tx, incoming_rx) = mpsc::channel(4);
    let (refresh_tx, mut refresh_rx) = mpsc::channel(4);
    let handler = CommandHandler::new(h.hmi.clone(), h.topics.clone(), h.targets.clone(), refresh_tx)
        .with_settle_delay(Duration::ZERO);
    let task = tokio::spawn(handler.run(incoming_rx));

    incoming_tx
        .send(IncomingMessage {
            topic: "benekov/http_192_168_1_50/status".to_string(),
            payload: b"online".to_vec(),
        })
        .await
        .unwrap();
    incoming_tx
        .send(IncomingMessage {
            topic: "benekov/http_192_168_1_50/HMI00001/o040/set".to_string(),
            payload: b"Off".to_vec(),
        })
        .await
        .unwrap();

    assert_eq!(refresh_rx.recv().await.as_deref(), Some("HMI00001.cgi"));
    drop(incoming_tx);
    task.await.unwrap();

    assert_eq!(h.hmi.writes().len(), 1);
    assert_eq!(h.hmi.writes()[0].2, "0");

    // The refreshed page publishes again
    h.poller.refresh_page("HMI00001.cgi").await;
    assert_eq!(
        h.sink
            .messages_on("benekov/http_192_168_1_50/HMI00001/o040/state")
            .len(),
        2
    );
}

/// A page the HMI rejects does not hold back the others.
#[tokio::test]
async fn test_failed_page_is_isolated() {
    let hmi = FakeHmi::new().with_page("HMI00001.cgi", HOME_LAYOUT, HOME_VALUES);
    let mut h = harness(hmi, Profile::All, &["HMI65000.cgi", "HMI00001.cgi"]);

    for _ in 0..3 {
        let summary = h.poller.poll_once().await;
        assert_eq!(summary.pages_ok, 1);
        assert_eq!(summary.pages_failed, 1);
    }

    assert_eq!(
        h.poller.health().page("HMI65000.cgi").unwrap().status,
        PageStatus::Offline
    );
    assert_eq!(
        h.poller.health().page("HMI00001.cgi").unwrap().status,
        PageStatus::Online
    );
    assert_eq!(
        h.sink
            .messages_on("benekov/http_192_168_1_50/HMI00001/o044/state")
            .len(),
        3
    );
}

/// A writable value item that happens to carry labels stays a number, so the
/// published state never falls outside announced select options.
#[tokio::test]
async fn test_labelled_value_item_is_a_number() {
    const LAYOUT: &str = r#"<div id="d1"><table><tr>
<td id="l1">Pump mode</td>
<td><span id="o041" it="v" mi="val:0x2400 0x100" e="Off*On*Auto">0</span></td>
</tr></table></div>"#;

    let hmi = FakeHmi::new().with_page("HMI00002.cgi", LAYOUT, "o041,v,2|");
    let mut h = harness(hmi, Profile::All, &["HMI00002.cgi"]);
    h.poller.poll_once().await;

    assert!(
        h.sink
            .last_on("homeassistant/select/climatix_http_192_168_1_50/hmi00002_o041/config")
            .is_none()
    );
    let mode = discovery_json(
        &h.sink,
        "homeassistant/number/climatix_http_192_168_1_50/hmi00002_o041/config",
    );
    assert!(mode.get("options").is_none());
    assert_eq!(
        h.sink
            .last_on("benekov/http_192_168_1_50/HMI00002/o041/state")
            .unwrap()
            .payload_str(),
        "2"
    );
}
