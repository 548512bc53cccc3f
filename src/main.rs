use shared_clustering::{
    ClusterableMatch, ClusteringParams, SharedClustering, TabSeparatedWriter, TracingProgress,
};
use std::error::Error;
use std::{env, fs, io};
use tracing_subscriber::EnvFilter;

fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(io::stderr)
        .init();

    let mut args = env::args().skip(1);
    let matches_path = args
        .next()
        .ok_or("usage: shared-clustering <matches.json> [params.json]")?;
    let contents = fs::read_to_string(&matches_path)?;
    let matches: Vec<ClusterableMatch> = serde_json::from_str(&contents)?;

    let params = match args.next() {
        Some(params_path) => serde_json::from_str(&fs::read_to_string(params_path)?)?,
        None => ClusteringParams::default(),
    };

    let progress = TracingProgress::new();
    let clusterer: SharedClustering<f64> = SharedClustering::new(params, &progress);
    let mut writer = TabSeparatedWriter::new(io::stdout().lock());
    let result = clusterer.cluster_and_write(&matches, &mut writer)?;
    tracing::info!(n_clusters = result.primary_clusters.len(), "done");
    Ok(())
}
