use goose::prelude::*;
use rand::Rng;

/// Load testing suite for the MediaKit media endpoint.
///
/// Simulates production traffic against a running server:
/// - Randomized variants of one source (mostly cache misses, then hits)
/// - A fixed variant (cache hits after warmup)
/// - Time-derived variants (guaranteed misses)
/// - Health monitoring
///
/// The server must have `sample.jpg` available as an origin.
///
/// # Usage
/// ```bash
/// cd loadtest
/// cargo run --release -- --host http://localhost:8080 --users 10 --hatch-rate 2 --run-time 60s
/// ```
#[tokio::main]
async fn main() -> Result<(), GooseError> {
    GooseAttack::initialize()?
        .register_scenario(
            scenario!("MediaTransformation")
                .register_transaction(transaction!(random_variant).set_weight(10)?)
                .register_transaction(transaction!(health_check).set_weight(1)?)
        )
        .register_scenario(
            scenario!("CachePerformance")
                .register_transaction(transaction!(cached_variant).set_weight(15)?)
                .register_transaction(transaction!(uncached_variant).set_weight(5)?)
        )
        .execute()
        .await?;

    Ok(())
}

/// Requests a random width/height/format of the sample image.
async fn random_variant(user: &mut GooseUser) -> TransactionResult {
    // Generate random parameters before await to satisfy Send bounds
    let path = {
        let mut rng = rand::thread_rng();
        let width = rng.gen_range(200..800);
        let height = rng.gen_range(200..800);
        let formats = ["webp", "jpeg", "avif"];
        let format = formats[rng.gen_range(0..formats.len())];

        format!("/cdn/w:{},h:{}/f:{}/sample.jpg", width, height, format)
    };

    let _goose = user.get(&path).await?;

    Ok(())
}

/// Fixed parameters; every request after the first is a cache hit.
async fn cached_variant(user: &mut GooseUser) -> TransactionResult {
    let _goose = user.get("/cdn/w:500,h:500/f:webp/q:80/sample.jpg").await?;

    Ok(())
}

/// Timestamp-derived dimensions force a transform.
async fn uncached_variant(user: &mut GooseUser) -> TransactionResult {
    let timestamp = chrono::Utc::now().timestamp_millis();
    let width = 200 + (timestamp % 600);

    let path = format!("/cdn/w:{}/f:webp/sample.jpg", width);
    let _goose = user.get(&path).await?;

    Ok(())
}

async fn health_check(user: &mut GooseUser) -> TransactionResult {
    let _goose = user.get("/health").await?;
    Ok(())
}
