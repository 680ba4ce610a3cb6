//! End-to-end tests: an app frame driving the shell's OS API through the SDK.

use async_trait::async_trait;
use chrono::Utc;
use photon_core::config::{DeviceConfig, ShellConfig};
use photon_core::models::{
    AppDefinition, CurrentUser, DeviceMessage, LinkedAccount, SendMessageResult, SlDevice,
};
use photon_core::transport::{Origin, OriginAllowList};
use photon_core::{PhotonError, Result};
use photon_sdk::PhotonOs;
use photon_shell::{
    start_ingress, DenyAll, DeviceGateway, IngressState, MemoryStore, RealtimeHub, Shell,
    ShellEvent, ShellStore,
};
use serde_json::{json, Value};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;

const USER: &str = "u1";

fn notes() -> AppDefinition {
    AppDefinition::new("com.example.notes", "Notes", "Example", "https://notes.example/")
}

fn todo() -> AppDefinition {
    AppDefinition::new("com.example.todo", "Todo", "Example", "https://todo.example/")
}

fn door() -> SlDevice {
    SlDevice {
        id: "dev-1".into(),
        name: "Front door".into(),
        object_key: "obj-1".into(),
        is_online: true,
        callback_url: Some("https://sim.example/door".into()),
        last_seen: None,
    }
}

fn door_message(message_type: &str) -> DeviceMessage {
    DeviceMessage {
        device_id: "dev-1".into(),
        object_key: "obj-1".into(),
        object_name: "Front door".into(),
        message_type: message_type.into(),
        payload: json!({"by": "Resident"}),
        timestamp: Utc::now(),
    }
}

/// Records outbound device messages instead of posting them.
#[derive(Default, Clone)]
struct RecordingGateway {
    sent: Arc<Mutex<Vec<(String, String, Value)>>>,
}

#[async_trait]
impl DeviceGateway for RecordingGateway {
    async fn send(
        &self,
        device: &SlDevice,
        message_type: &str,
        payload: &Value,
    ) -> Result<SendMessageResult> {
        self.sent.lock().unwrap().push((
            device.id.clone(),
            message_type.to_string(),
            payload.clone(),
        ));
        Ok(SendMessageResult::delivered())
    }
}

struct TestShell {
    shell: Shell,
    store: Arc<MemoryStore>,
    hub: RealtimeHub,
    gateway: RecordingGateway,
}

impl TestShell {
    fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let hub = RealtimeHub::new();
        let gateway = RecordingGateway::default();
        let shell = Shell::builder()
            .user(CurrentUser::new(USER, "Resident"))
            .shared_store(store.clone())
            .hub(hub.clone())
            .gateway(gateway.clone())
            .build()
            .unwrap();
        Self {
            shell,
            store,
            hub,
            gateway,
        }
    }

    /// Mount `app` and connect an SDK client from inside its frame.
    fn mount(&self, app: &AppDefinition) -> PhotonOs {
        let window = self.shell.open_app_frame(app).unwrap();
        let shell_origin = Origin::parse(ShellConfig::DEFAULT_SHELL_URL).unwrap();
        PhotonOs::connect(window, OriginAllowList::new([shell_origin]))
            .unwrap()
            .with_timeout(Duration::from_secs(5))
    }
}

async fn eventually(mut condition: impl FnMut() -> bool) {
    for _ in 0..200 {
        if condition() {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("condition never became true");
}

fn recorder() -> (
    impl Fn(&DeviceMessage) -> Result<()> + Send + Sync + 'static,
    mpsc::UnboundedReceiver<DeviceMessage>,
) {
    let (tx, rx) = mpsc::unbounded_channel();
    let listener = move |message: &DeviceMessage| {
        let _ = tx.send(message.clone());
        Ok(())
    };
    (listener, rx)
}

async fn next(rx: &mut mpsc::UnboundedReceiver<DeviceMessage>) -> DeviceMessage {
    tokio::time::timeout(Duration::from_secs(5), rx.recv())
        .await
        .expect("no device message arrived")
        .expect("listener dropped")
}

#[tokio::test]
async fn test_current_user() {
    let t = TestShell::new();
    let os = t.mount(&notes());

    let user = os.user().get_current_user().await.unwrap();
    assert_eq!(user, CurrentUser::new(USER, "Resident"));

    t.shell.state().sign_out();
    let err = os.user().get_current_user().await.unwrap_err();
    assert!(err.to_string().contains("no user is signed in"));
}

#[tokio::test]
async fn test_install_launch_and_home() {
    let t = TestShell::new();
    let os = t.mount(&notes());
    let mut events = t.shell.subscribe_events();
    let mut running = t.shell.running_apps();

    let result = os.apps().launch_app(&notes()).await.unwrap();
    assert!(!result.launched);
    assert!(result.error.unwrap().contains("not installed"));

    os.apps().request_app_install(&notes()).await.unwrap();
    // A second request is absorbed.
    os.apps().request_app_install(&notes()).await.unwrap();
    assert_eq!(
        events.recv().await.unwrap(),
        ShellEvent::AppInstalled {
            bundle_id: "com.example.notes".into()
        }
    );

    let apps = os.apps().get_installed_apps().await.unwrap();
    let ids: Vec<&str> = apps.iter().map(|a| a.bundle_id.as_str()).collect();
    assert_eq!(
        ids,
        vec![
            ShellConfig::LAUNCHER_BUNDLE_ID,
            ShellConfig::SETTINGS_BUNDLE_ID,
            ShellConfig::APP_STORE_BUNDLE_ID,
            "com.example.notes",
        ]
    );

    let result = os.apps().launch_app(&notes()).await.unwrap();
    assert!(result.launched);
    running.changed().await.unwrap();
    {
        let snapshot = running.borrow_and_update();
        let foreground: Vec<&str> = snapshot
            .iter()
            .filter(|i| !i.is_in_background)
            .map(|i| i.bundle_id())
            .collect();
        assert_eq!(foreground, vec!["com.example.notes"]);
    }

    os.system().home_button().await.unwrap();
    let state = t.shell.state();
    let snapshot = state.running_apps().borrow().clone();
    let launcher = snapshot
        .iter()
        .find(|i| i.bundle_id() == ShellConfig::LAUNCHER_BUNDLE_ID)
        .unwrap();
    assert!(!launcher.is_in_background);
    assert_eq!(snapshot.iter().filter(|i| !i.is_in_background).count(), 1);

    os.apps().foreground_app(&notes()).await.unwrap();
}

#[tokio::test]
async fn test_foreground_requires_running_app() {
    let t = TestShell::new();
    let os = t.mount(&notes());

    let err = os.apps().foreground_app(&todo()).await.unwrap_err();
    assert!(matches!(err, PhotonError::Remote { .. }));
    assert!(err.to_string().contains("not running"));
}

#[tokio::test]
async fn test_uninstall_closes_app_and_protects_system_apps() {
    let t = TestShell::new();
    let os = t.mount(&notes());

    os.apps().request_app_install(&todo()).await.unwrap();
    os.apps().launch_app(&todo()).await.unwrap();
    os.apps().request_app_uninstall(&todo()).await.unwrap();

    let running = t.shell.running_apps().borrow().clone();
    assert!(running.iter().all(|i| i.bundle_id() != "com.example.todo"));
    assert!(t.store.installed_apps(USER).await.unwrap().is_empty());

    let launcher = t.shell.state().system_apps()[0].clone();
    let err = os.apps().request_app_uninstall(&launcher).await.unwrap_err();
    assert!(err.to_string().contains("cannot be uninstalled"));
}

#[tokio::test]
async fn test_declined_install() {
    let shell = Shell::builder()
        .user(CurrentUser::new(USER, "Resident"))
        .consent(DenyAll)
        .build()
        .unwrap();
    let window = shell.open_app_frame(&notes()).unwrap();
    let shell_origin = Origin::parse(ShellConfig::DEFAULT_SHELL_URL).unwrap();
    let os = PhotonOs::connect(window, OriginAllowList::new([shell_origin])).unwrap();

    let err = os.apps().request_app_install(&todo()).await.unwrap_err();
    assert!(err.to_string().contains("declined"));
}

#[tokio::test]
async fn test_sandboxed_prefs_are_isolated_per_app() {
    let t = TestShell::new();
    let notes_os = t.mount(&notes());
    let todo_os = t.mount(&todo());

    notes_os.prefs().set_sandboxed("theme", &"dark").await.unwrap();
    assert_eq!(
        notes_os.prefs().get_sandboxed("theme").await.unwrap(),
        Some(json!("dark"))
    );
    assert_eq!(todo_os.prefs().get_sandboxed("theme").await.unwrap(), None);

    notes_os.prefs().set_shared("locale", &"en-GB").await.unwrap();
    assert_eq!(
        todo_os.prefs().get_shared("locale").await.unwrap(),
        Some(json!("en-GB"))
    );

    notes_os.prefs().delete_sandboxed("theme").await.unwrap();
    assert_eq!(notes_os.prefs().get_sandboxed("theme").await.unwrap(), None);
    todo_os.prefs().delete_shared("locale").await.unwrap();
    assert_eq!(notes_os.prefs().get_shared("locale").await.unwrap(), None);

    let err = notes_os.prefs().get_shared("").await.unwrap_err();
    assert!(err.to_string().contains("key"));
}

#[tokio::test]
async fn test_linked_accounts() {
    let t = TestShell::new();
    let os = t.mount(&notes());
    t.store
        .link_account(
            USER,
            &LinkedAccount {
                avatar_uuid: "a-1".into(),
                avatar_name: "Resident One".into(),
                linked_at: Utc::now(),
            },
        )
        .await
        .unwrap();

    let accounts = os.accounts().get_linked_second_life_accounts().await.unwrap();
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].avatar_name, "Resident One");

    os.accounts().unlink_second_life_account("a-1").await.unwrap();
    // Unlinking twice is absorbed.
    os.accounts().unlink_second_life_account("a-1").await.unwrap();
    assert!(os
        .accounts()
        .get_linked_second_life_accounts()
        .await
        .unwrap()
        .is_empty());
}

#[tokio::test]
async fn test_send_device_message() {
    let t = TestShell::new();
    let os = t.mount(&notes());
    t.store.register_device(USER, &door()).await.unwrap();

    let devices = os.devices().get_registered().await.unwrap();
    assert_eq!(devices, vec![door()]);

    let result = os
        .devices()
        .send_message("dev-1", "open", &json!({"speed": 2}))
        .await
        .unwrap();
    assert!(result.success);
    assert_eq!(
        *t.gateway.sent.lock().unwrap(),
        vec![("dev-1".to_string(), "open".to_string(), json!({"speed": 2}))]
    );

    let result = os
        .devices()
        .send_message("dev-9", "open", &Value::Null)
        .await
        .unwrap();
    assert!(!result.success);
    assert!(result.error.unwrap().contains("dev-9"));
}

#[tokio::test]
async fn test_device_messages_reach_listeners() {
    let t = TestShell::new();
    let os = t.mount(&notes());
    let (l1, mut rx1) = recorder();
    let (l2, mut rx2) = recorder();

    let h1 = os.devices().add_listener(l1).await.unwrap();
    let h2 = os.devices().add_listener(l2).await.unwrap();
    assert_eq!(t.hub.lease_count(USER), 1);

    assert_eq!(t.hub.publish(USER, door_message("opened")), 1);
    assert_eq!(next(&mut rx1).await.message_type, "opened");
    assert_eq!(next(&mut rx2).await.message_type, "opened");

    h1.unsubscribe().await.unwrap();
    assert_eq!(t.hub.lease_count(USER), 1);
    h2.unsubscribe().await.unwrap();

    let state = t.shell.state().clone();
    let hub = t.hub.clone();
    eventually(|| state.device_streams().active() == 0 && !hub.is_open(USER)).await;
}

#[tokio::test]
async fn test_sign_out_stops_device_streams() {
    let t = TestShell::new();
    let os = t.mount(&notes());
    let (listener, _rx) = recorder();

    let _handle = os.devices().add_listener(listener).await.unwrap();
    assert!(t.hub.is_open(USER));

    t.shell.state().sign_out();
    let hub = t.hub.clone();
    eventually(|| !hub.is_open(USER)).await;
}

#[tokio::test]
async fn test_dropped_subscription_releases_device_stream() {
    let t = TestShell::new();
    let os = t.mount(&notes());

    let subscription = os.api().subscribe(DeviceConfig::TOPIC).await.unwrap();
    assert_eq!(t.hub.lease_count(USER), 1);
    assert_eq!(t.shell.state().device_streams().active(), 1);

    drop(subscription);
    let state = t.shell.state().clone();
    let hub = t.hub.clone();
    eventually(|| state.device_streams().active() == 0 && !hub.is_open(USER)).await;
    assert_eq!(t.hub.publish(USER, door_message("opened")), 0);
}

#[tokio::test]
async fn test_plain_unsubscribe_stops_callers_streams() {
    let t = TestShell::new();
    let os = t.mount(&notes());
    let (listener, _rx) = recorder();

    let _handle = os.devices().add_listener(listener).await.unwrap();
    os.api().call("devices_unsubscribe", vec![]).await.unwrap();

    let hub = t.hub.clone();
    eventually(|| !hub.is_open(USER)).await;
}

#[tokio::test]
async fn test_ingress_delivers_to_subscribed_app() {
    let t = TestShell::new();
    t.store.register_device(USER, &door()).await.unwrap();
    let os = t.mount(&notes());
    let (listener, mut rx) = recorder();
    let _handle = os.devices().add_listener(listener).await.unwrap();

    let ingress = Arc::new(IngressState {
        hub: t.hub.clone(),
        store: t.store.clone(),
        token: Some("s3cret".into()),
    });
    let (addr, server) = start_ingress(ingress, "127.0.0.1", 0).await.unwrap();

    let response = reqwest::Client::new()
        .post(format!("http://{}/devices/messages", addr))
        .header(DeviceConfig::INGRESS_TOKEN_HEADER, "s3cret")
        .json(&door_message("knocked"))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), reqwest::StatusCode::ACCEPTED);

    let message = next(&mut rx).await;
    assert_eq!(message.message_type, "knocked");
    assert_eq!(message.payload["by"], "Resident");
    server.abort();
}
