pub fn init_metrics() {
    metrics_exporter_prometheus::PrometheusBuilder::new()
        .with_http_listener(([0, 0, 0, 0], 2000))
        .install()
        .expect("BUG: failed to initialize the metrics listener");
}
