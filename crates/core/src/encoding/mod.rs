pub mod encoding_aggregator;
