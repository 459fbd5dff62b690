//! RustVaultIO - Main entry point
//!
//! Start-up order:
//! 1. ESP-IDF patches, logger, NVS
//! 2. Wi-Fi station (credentials from NVS `wifi`)
//! 3. MQTT client (settings from NVS `mqtt`)
//! 4. IoService: restore saved pins, start the io-worker
//! 5. Control loop: commands, sampler tick, heartbeat, event log drain

#[cfg(target_os = "espidf")]
fn main() -> anyhow::Result<()> {
    firmware::run()
}

#[cfg(not(target_os = "espidf"))]
fn main() {
    println!(
        "{}: firmware binary, build for an ESP-IDF target (e.g. xtensa-esp32-espidf)",
        env!("VERSION_STRING")
    );
}

#[cfg(target_os = "espidf")]
mod firmware {
    use std::sync::atomic::{AtomicBool, Ordering};
    use std::sync::mpsc::{self, RecvTimeoutError};
    use std::sync::Arc;
    use std::time::Duration;

    use anyhow::{anyhow, bail, Context};
    use esp_idf_svc::eventloop::EspSystemEventLoop;
    use esp_idf_svc::hal::delay::FreeRtos;
    use esp_idf_svc::hal::modem::Modem;
    use esp_idf_svc::hal::prelude::Peripherals;
    use esp_idf_svc::mqtt::client::{EspMqttClient, EventPayload, MqttClientConfiguration};
    use esp_idf_svc::nvs::{EspDefaultNvsPartition, EspNvs};
    use esp_idf_svc::sys::{self, esp};
    use esp_idf_svc::wifi::{AuthMethod, BlockingWifi, ClientConfiguration, Configuration, EspWifi};

    use rust_vault_io::commands::{self, Reply};
    use rust_vault_io::device::{DeviceInfo, Heartbeat};
    use rust_vault_io::hal::esp::{EspClock, EspGpio};
    use rust_vault_io::hal::Clock;
    use rust_vault_io::log_drain::LogDrain;
    use rust_vault_io::publish::{MqttPublisher, Publisher};
    use rust_vault_io::store::{DurableStore, EspNvsStore};
    use rust_vault_io::IoService;

    /// Control loop period.
    const TICK: Duration = Duration::from_millis(10);

    const DEFAULT_MQTT_PORT: i32 = 1883;

    /// Time for "restarting" to leave before the reboot.
    const RESTART_GRACE_MS: u32 = 1_000;

    /// Inbound MQTT traffic, forwarded from the client callback.
    enum Inbound {
        Connected,
        Message { topic: String, payload: Vec<u8> },
    }

    struct MqttSettings {
        server: String,
        port: i32,
        user: Option<String>,
        password: Option<String>,
    }

    pub fn run() -> anyhow::Result<()> {
        esp_idf_svc::sys::link_patches();
        esp_idf_svc::log::EspLogger::initialize_default();
        log::info!("{}", env!("VERSION_STRING"));

        let peripherals = Peripherals::take()?;
        let sysloop = EspSystemEventLoop::take()?;
        let nvs = EspDefaultNvsPartition::take()?;
        let settings = EspNvsStore::new(nvs.clone());

        let wifi = connect_wifi(peripherals.modem, sysloop, nvs.clone(), &settings)?;

        let device_id = format!("{:x}", efuse_mac_low());
        let client_id = format!("ESP32-Vault-{}", device_id);
        let base = format!("esp32vault/{}", client_id);
        log::info!("Base topic: {}", base);

        let mqtt = load_mqtt_settings(&nvs)?;
        let url = format!("mqtt://{}:{}", mqtt.server, mqtt.port);
        let conf = MqttClientConfiguration {
            client_id: Some(&client_id),
            username: mqtt.user.as_deref(),
            password: mqtt.password.as_deref(),
            ..Default::default()
        };

        let connected = Arc::new(AtomicBool::new(false));
        let (tx, rx) = mpsc::channel::<Inbound>();
        let flag = Arc::clone(&connected);
        let client = EspMqttClient::new_cb(&url, &conf, move |event| match event.payload() {
            EventPayload::Connected(_) => {
                flag.store(true, Ordering::Release);
                let _ = tx.send(Inbound::Connected);
            }
            EventPayload::Disconnected => flag.store(false, Ordering::Release),
            EventPayload::Received { topic, data, .. } => {
                if let Some(topic) = topic {
                    let _ = tx.send(Inbound::Message {
                        topic: topic.to_string(),
                        payload: data.to_vec(),
                    });
                }
            }
            _ => {}
        })
        .context("MQTT client")?;
        let publisher = Arc::new(MqttPublisher::new(client, connected));

        let clock = Arc::new(EspClock);
        let mut service = match EspGpio::new()
            .map_err(anyhow::Error::from)
            .and_then(|gpio| {
                IoService::begin(
                    Arc::new(gpio),
                    clock.clone(),
                    Box::new(EspNvsStore::new(nvs.clone())),
                    publisher.clone(),
                )
                .map_err(anyhow::Error::from)
            }) {
            Ok(service) => Some(service),
            Err(e) => {
                log::error!("IO capture disabled: {:#}", e);
                None
            }
        };

        let status_topic = format!("{}/status", base);
        let mut drain = LogDrain::new();
        let mut heartbeat = Heartbeat::default();

        loop {
            match rx.recv_timeout(TICK) {
                Ok(Inbound::Connected) => {
                    log::info!("MQTT connected");
                    if let Err(e) = publisher.subscribe(&format!("{}/cmd/#", base)) {
                        log::warn!("Subscribe failed: {:?}", e);
                    }
                    publisher.publish(&status_topic, "online", true);
                    if service.is_none() {
                        publisher.publish(&status_topic, "io_capture_disabled", true);
                    }
                }
                Ok(Inbound::Message { topic, payload }) => match service.as_mut() {
                    Some(svc) => match commands::handle(svc, &base, &topic, &payload) {
                        Ok(Reply::Restart) => restart(),
                        Ok(_) => {}
                        Err(e) => log::debug!("{} -> {}", topic, e),
                    },
                    None if commands::command_suffix(&base, &topic) == Some(commands::RESTART) => {
                        publisher.publish(&status_topic, "restarting", true);
                        restart();
                    }
                    None => publisher.publish(&status_topic, "io_capture_disabled", true),
                },
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => bail!("MQTT event channel closed"),
            }

            if let Some(svc) = service.as_mut() {
                svc.tick();
            }

            let now = clock.now_ms();
            if heartbeat.due(now) && publisher.is_connected() {
                let info = device_info(&wifi, &device_id, now);
                publisher.publish(&status_topic, &info.to_json(), true);
            }
            drain.drain_into_log(now);
        }
    }

    fn restart() -> ! {
        log::warn!("Restarting");
        FreeRtos::delay_ms(RESTART_GRACE_MS);
        esp_idf_svc::hal::reset::restart()
    }

    fn device_info(
        wifi: &BlockingWifi<EspWifi<'static>>,
        device_id: &str,
        now_ms: u64,
    ) -> DeviceInfo {
        let ip_address = wifi
            .wifi()
            .sta_netif()
            .get_ip_info()
            .map(|info| info.ip.to_string())
            .unwrap_or_default();

        let mut ap = sys::wifi_ap_record_t::default();
        // SAFETY: `ap` is a valid out-parameter for the duration of the call
        let wifi_rssi = match esp!(unsafe { sys::esp_wifi_sta_get_ap_info(&mut ap) }) {
            Ok(()) => i32::from(ap.rssi),
            Err(_) => 0,
        };

        DeviceInfo {
            device_id: device_id.to_string(),
            uptime: now_ms / 1000,
            // SAFETY: plain heap statistics query
            free_heap: unsafe { sys::esp_get_free_heap_size() },
            wifi_rssi,
            ip_address,
            // Only ever published over a live connection
            mqtt_connected: true,
        }
    }

    /// Single connect attempt; no reconnection strategy.
    fn connect_wifi(
        modem: Modem,
        sysloop: EspSystemEventLoop,
        nvs: EspDefaultNvsPartition,
        settings: &EspNvsStore,
    ) -> anyhow::Result<BlockingWifi<EspWifi<'static>>> {
        let ssid = settings
            .get("wifi", "ssid")
            .filter(|s| !s.is_empty())
            .ok_or_else(|| anyhow!("no Wi-Fi credentials in NVS"))?;
        let password = settings.get("wifi", "password").unwrap_or_default();

        let mut wifi = BlockingWifi::wrap(EspWifi::new(modem, sysloop.clone(), Some(nvs))?, sysloop)?;
        wifi.set_configuration(&Configuration::Client(ClientConfiguration {
            ssid: ssid.as_str().try_into().map_err(|_| anyhow!("SSID too long"))?,
            password: password
                .as_str()
                .try_into()
                .map_err(|_| anyhow!("Wi-Fi password too long"))?,
            auth_method: if password.is_empty() {
                AuthMethod::None
            } else {
                AuthMethod::WPA2Personal
            },
            ..Default::default()
        }))?;

        wifi.start()?;
        wifi.connect()?;
        wifi.wait_netif_up()?;
        log::info!("Wi-Fi connected to {}", ssid);
        Ok(wifi)
    }

    fn load_mqtt_settings(nvs: &EspDefaultNvsPartition) -> anyhow::Result<MqttSettings> {
        let storage = EspNvs::new(nvs.clone(), "mqtt", true)?;
        let mut buf = [0u8; 128];

        let mut read = |key: &str| -> Option<String> {
            match storage.get_str(key, &mut buf) {
                Ok(Some(v)) if !v.is_empty() => Some(v.to_string()),
                _ => None,
            }
        };

        let Some(server) = read("server") else {
            bail!("no MQTT server in NVS");
        };
        let user = read("user");
        let password = read("password");
        let port = storage.get_i32("port").ok().flatten().unwrap_or(DEFAULT_MQTT_PORT);

        Ok(MqttSettings {
            server,
            port,
            user,
            password,
        })
    }

    /// Low 32 bits of the factory MAC, as used in the device name.
    fn efuse_mac_low() -> u32 {
        let mut mac = [0u8; 6];
        // SAFETY: buffer is the 6 bytes the call writes
        unsafe {
            sys::esp_efuse_mac_get_default(mac.as_mut_ptr());
        }
        u32::from_le_bytes([mac[0], mac[1], mac[2], mac[3]])
    }
}
