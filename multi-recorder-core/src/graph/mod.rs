pub mod capture_graph;
