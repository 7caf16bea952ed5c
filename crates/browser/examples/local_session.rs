//! Local session example - a Conductor and a Collaborator in one process

use std::time::Duration;

use browser::{
    Collaborator, Conductor, HeadlessSurface, MemoryFetcher, RenderOptions, SessionConfig,
    TextSurface,
};

const HOME: &str = "http://example.test/index.html";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::fmt::init();

    let fetcher = MemoryFetcher::new()
        .with_page(
            HOME,
            r#"<html><head><title>Welcome</title></head>
               <body><h1>Hello</h1><p>Line one<br>line two</p>
               <a href="about.html">About</a></body></html>"#,
        )
        .with_page(
            "http://example.test/about.html",
            "<html><head><title>About</title></head><body><p>Nothing to see.</p></body></html>",
        );

    let config = SessionConfig {
        name: "conductor".to_string(),
        port: 0,
        ..SessionConfig::default()
    };
    let mut conductor = Conductor::new(config, Box::new(fetcher), Box::new(HeadlessSurface));
    let addr = conductor.bind().await?;
    conductor.go(HOME).await?;
    println!("Conductor listening on {}", addr);

    // The collaborator prints what it mirrors
    let config = SessionConfig {
        name: "collaborator".to_string(),
        port: addr.port(),
        ..SessionConfig::default()
    };
    let surface = TextSurface::new(std::io::stdout(), RenderOptions::default());
    let mut collaborator = Collaborator::connect(config, Box::new(surface)).await?;

    let mut event_rx = collaborator.events().subscribe();

    let mut followed = false;
    for _ in 0..20 {
        conductor.poll_network().await;
        collaborator.poll_network()?;

        // Once the home page arrived, ask the conductor to follow the first link
        if !followed && collaborator.page().is_some() {
            collaborator.follow(0).await?;
            followed = true;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }

    while let Ok(event) = event_rx.try_recv() {
        println!("Event: {:?}", event);
    }

    conductor.shutdown();
    Ok(())
}
