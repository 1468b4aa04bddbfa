use anyhow::Error;
use serde_json::json;
use solr_buffer::clients::solr::SolrClient;
use solr_buffer::{BufferedAdd, LogSink};
use std::collections::HashMap;
use tracing::info;
use tracing_subscriber::FmtSubscriber;

#[tokio::main]
async fn main() -> Result<(), Error> {
    let subscriber = FmtSubscriber::builder()
        .with_max_level(tracing::Level::DEBUG)
        .finish();
    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    let host = "localhost";
    let port = "8983";
    let core = "collection1";

    let mut buffer = BufferedAdd::new(SolrClient::new(host, port, core), LogSink);
    buffer.set_buffer_size(10)?;

    for i in 0..25 {
        buffer
            .create_document(
                HashMap::from([
                    ("id".to_string(), json!(format!("doc-{}", i))),
                    ("title".to_string(), json!(format!("Document {}", i))),
                ]),
                HashMap::new(),
            )
            .await?;
    }

    let result = buffer.commit(None, Some(true), Some(true), None).await?;
    info!(
        "Commit finished, status: {}, took: {}ms",
        result.response_header.status, result.response_header.qtime
    );

    Ok(())
}
