//! MQTT broker client management

#[cfg(feature = "mqtt")]
use std::time::Duration;

#[cfg(feature = "mqtt")]
use rumqttc::{AsyncClient, Event, MqttOptions};

use crate::{config::MqttConfig, error::{Error, Result}};

/// An MQTT client can still be addressed after the broker connection drops;
/// the background event-loop task below handles rumqttc's own reconnect.
#[cfg(feature = "mqtt")]
pub type MqttClient = AsyncClient;

/// Build an MQTT client and drive its event loop in the background.
///
/// `rumqttc::AsyncClient` only makes progress while something polls the
/// paired `EventLoop` — unlike the database/Redis/NATS clients, publishing
/// doesn't happen automatically on its own task, so we spawn one here and
/// give it ownership of the event loop for the life of the process.
#[cfg(feature = "mqtt")]
pub(crate) async fn create_client(config: &MqttConfig) -> Result<MqttClient> {
    let mut options = MqttOptions::new(&config.client_id, &config.host, config.port);
    options.set_keep_alive(Duration::from_secs(config.keep_alive_secs));

    if let (Some(username), Some(password)) = (&config.username, &config.password) {
        options.set_credentials(username, password);
    }

    let (client, mut event_loop) = AsyncClient::new(options, 64);

    // Confirm the broker is reachable before returning the client, mirroring
    // the other pool agents' "first connection attempt fails fast" contract.
    match event_loop.poll().await {
        Ok(Event::Incoming(rumqttc::Packet::ConnAck(_))) => {}
        Ok(_) => {}
        Err(e) => {
            return Err(Error::External(format!(
                "Failed to connect to MQTT broker at '{}:{}'\n\n\
                Troubleshooting:\n\
                1. Verify the broker is running and reachable: telnet {} {}\n\
                2. Check client_id '{}' isn't already in use by another client\n\
                3. Verify username/password if the broker requires authentication\n\n\
                Error: {}",
                config.host, config.port, config.host, config.port, config.client_id, e
            )));
        }
    }

    tokio::spawn(async move {
        loop {
            match event_loop.poll().await {
                Ok(_) => {}
                Err(e) => {
                    tracing::warn!("MQTT event loop error, rumqttc will reconnect: {}", e);
                    tokio::time::sleep(Duration::from_secs(1)).await;
                }
            }
        }
    });

    Ok(client)
}
