use mixer::dcid::Dcid;
use mixer::handlers::{self, PropertyLabelsRequest};
use mixer::store::{InstanceKind, OverlayCache, RocksDbRowStore, RowStoreInstance, StoreFacade};
use std::sync::Arc;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    println!("mixer v{}", mixer::version());

    let dir = tempfile_dir();
    let store = RocksDbRowStore::open(&dir).expect("open local row-store");
    let instance = RowStoreInstance {
        name: "demo".to_string(),
        kind: InstanceKind::Base,
        client: Arc::new(store),
    };
    let facade = StoreFacade::new(Arc::new(OverlayCache::new()), vec![instance]);

    let dcid = Dcid::parse("geoId/06").unwrap();
    let resp = handlers::property_labels(&facade, PropertyLabelsRequest { dcids: vec![dcid.clone()] })
        .await
        .unwrap();
    let labels = resp.labels.get(&dcid).cloned().unwrap_or_default();
    println!("property labels for {dcid}: in={:?} out={:?}", labels.in_labels, labels.out_labels);
}

fn tempfile_dir() -> std::path::PathBuf {
    std::env::temp_dir().join(format!("mixer-demo-{}", std::process::id()))
}
