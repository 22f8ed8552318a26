use std::env;

use keylink::EngineBuilder;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .init();

    let port_name = env::args().nth(1).unwrap_or_else(|| {
        keylink::enumerate_devices()
            .ok()
            .and_then(|devices| devices.into_iter().next())
            .map(|device| device.port_name)
            .unwrap_or_else(|| "/dev/ttyUSB0".to_string())
    });

    let engine = EngineBuilder::new().port(&port_name).build()?;

    let mut events = engine.subscribe();
    tokio::spawn(async move {
        while let Ok(event) = events.recv().await {
            tracing::info!(?event, "engine event");
        }
    });

    let reply = engine.send([0x1fu8, 0x00]).await?;
    println!("{reply:?}");

    engine.close();
    Ok(())
}
