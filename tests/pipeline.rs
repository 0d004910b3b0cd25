//! Integration tests for the dashboard analysis flows.

use microviz::prelude::*;
use nalgebra::DMatrix;
use serde_json::Value;
use std::io::Write;
use tempfile::TempDir;

const GENERA: [&str; 6] = [
    "Escherichia",
    "Bacillus",
    "Pseudomonas",
    "Clostridium",
    "Vibrio",
    "Streptomyces",
];

fn simple_rand(seed: &mut u64) -> f64 {
    *seed = seed.wrapping_mul(1103515245).wrapping_add(12345);
    ((*seed >> 16) & 0x7FFF) as f64 / 32768.0
}

/// Write a synthetic per-study genus table with two community types.
///
/// The first half of the runs is dominated by the first three genera, the
/// second half by the last three, so beta diversity splits the runs into
/// two clear clusters.
fn write_study_table(root: &TempDir, study: &str, run_prefix: &str, n_runs: usize) -> Vec<String> {
    let run_ids: Vec<String> = (0..n_runs)
        .map(|i| format!("{}{:02}", run_prefix, i))
        .collect();
    let dir = root.path().join(study);
    std::fs::create_dir_all(&dir).unwrap();
    let path = dir.join(format!("{}_genus_taxonomy_v5.0.csv", study));
    let mut file = std::fs::File::create(path).unwrap();

    write!(file, "Superkingdom,Phylum,Genus").unwrap();
    for run in &run_ids {
        write!(file, ",{}", run).unwrap();
    }
    writeln!(file).unwrap();

    let mut seed = 42u64;
    for (g, genus) in GENERA.iter().enumerate() {
        write!(file, "Bacteria,Proteobacteria,{}", genus).unwrap();
        for r in 0..n_runs {
            let first_community = r < n_runs / 2;
            let abundant = if first_community { g < 3 } else { g >= 3 };
            let base = if abundant { 400.0 } else { 4.0 };
            let noise = 0.9 + 0.2 * simple_rand(&mut seed);
            write!(file, ",{}", (base * noise).round()).unwrap();
        }
        writeln!(file).unwrap();
    }
    file.flush().unwrap();
    run_ids
}

/// Write run metadata with one sample per run and load it back.
fn write_run_metadata(root: &TempDir, name: &str, run_ids: &[String]) -> SampleMetadata {
    let path = root.path().join(name);
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(
        file,
        "sample_id,assembly_run_ids,biome,biome_feature,biome_material,\
         sampling_country,experiment_type,pipeline_version,instrument_platform"
    )
    .unwrap();
    for (i, run) in run_ids.iter().enumerate() {
        writeln!(
            file,
            "S{},{},Wastewater,sludge,activated,Denmark,metagenomic,5.0,Illumina",
            i, run
        )
        .unwrap();
    }
    file.flush().unwrap();
    SampleMetadata::from_csv(&path).unwrap()
}

#[test]
fn test_study_flow_separates_communities() {
    let root = TempDir::new().unwrap();
    let runs = write_study_table(&root, "MGYS90001", "ERRA", 8);

    let table = load_study_table(root.path(), "MGYS90001", TaxonomicRank::Genus).unwrap();
    assert_eq!(table.n_taxa(), 6);
    assert_eq!(table.n_samples(), 8);
    assert_eq!(table.sample_ids(), runs.as_slice());

    let metadata = write_run_metadata(&root, "samples.csv", &runs);
    let beta = beta_diversity_study(&table, &metadata).unwrap();
    let matrix = &beta.matrix;
    assert_eq!(matrix.ids(), runs.as_slice());

    for i in 0..8 {
        assert!(matrix.get(i, i).abs() < 1e-12, "diagonal must be zero");
        for j in 0..8 {
            let d = matrix.get(i, j);
            assert!((d - matrix.get(j, i)).abs() < 1e-12, "must be symmetric");
            assert!((0.0..=1.0).contains(&d), "distance {} out of range", d);
        }
    }

    // distances within a community are far smaller than across
    let within = (matrix.get(0, 1) + matrix.get(4, 5)) / 2.0;
    let across = matrix.get(0, 4);
    assert!(
        within < across,
        "within-community distance {} should undercut across-community {}",
        within,
        across
    );
    assert!(across > 0.8, "communities share almost nothing, got {}", across);

    let embedding = pcoa(matrix).unwrap();
    assert_eq!(embedding.sample_ids, runs);
    assert!(embedding.proportion_explained[0] >= embedding.proportion_explained[1]);
    assert!(
        embedding.proportion_explained[0] > 0.5,
        "a two-community design should load on PC1, got {}",
        embedding.proportion_explained[0]
    );

    let mean_first: f64 = embedding.pc1[..4].iter().sum::<f64>() / 4.0;
    let mean_second: f64 = embedding.pc1[4..].iter().sum::<f64>() / 4.0;
    assert!(
        (mean_first - mean_second).abs() > 0.3,
        "PC1 should separate the communities: {} vs {}",
        mean_first,
        mean_second
    );

    let frame = OrdinationFrame::single_study(&embedding, &beta.samples).unwrap();
    assert_eq!(frame.len(), 8);
    assert_eq!(frame.records()[0].biome.as_deref(), Some("Wastewater"));
    assert!(frame.records()[0].study.is_none());

    let out = root.path().join("embedding.csv");
    frame.to_csv(&out).unwrap();
    let content = std::fs::read_to_string(&out).unwrap();
    assert!(content.starts_with("run_id,PC1,PC2"));
    assert_eq!(content.lines().count(), 9);
}

#[test]
fn test_multi_run_samples_expand_to_rows() {
    let root = TempDir::new().unwrap();
    let path = root.path().join("samples.csv");
    let mut file = std::fs::File::create(&path).unwrap();
    writeln!(file, "sample_id,assembly_run_ids,biome").unwrap();
    writeln!(file, "S1,R1;R2,Wastewater").unwrap();
    writeln!(file, "S2,R3,Marine").unwrap();
    file.flush().unwrap();
    let metadata = SampleMetadata::from_csv(&path).unwrap();

    let table = AbundanceTable::new(
        DMatrix::from_row_slice(2, 3, &[5.0, 4.0, 1.0, 1.0, 2.0, 9.0]),
        vec!["Escherichia".to_string(), "Bacillus".to_string()],
        vec!["R1".to_string(), "R2".to_string(), "R3".to_string()],
    )
    .unwrap();

    let beta = beta_diversity_study(&table, &metadata).unwrap();
    // one sample row fans out to one record per listed run
    assert_eq!(beta.samples.len(), 3);
    assert_eq!(beta.samples.get(0).unwrap().sample_id.as_deref(), Some("S1"));
    assert_eq!(beta.samples.get(1).unwrap().sample_id.as_deref(), Some("S1"));
    assert_eq!(beta.samples.get(2).unwrap().sample_id.as_deref(), Some("S2"));
    assert_eq!(beta.samples.get(2).unwrap().biome.as_deref(), Some("Marine"));
}

#[test]
fn test_comparison_flow_labels_by_study() {
    let root = TempDir::new().unwrap();
    let runs_a = write_study_table(&root, "MGYS90001", "ERRA", 4);
    let runs_b = write_study_table(&root, "MGYS90002", "ERRB", 3);

    let table_a = load_study_table(root.path(), "MGYS90001", TaxonomicRank::Genus).unwrap();
    let table_b = load_study_table(root.path(), "MGYS90002", TaxonomicRank::Genus).unwrap();
    let pooled = pool_tables(&[("MGYS90001", &table_a), ("MGYS90002", &table_b)]).unwrap();
    assert_eq!(pooled.n_samples(), 7);

    let matrix = beta_diversity_comparison(&pooled).unwrap();
    let expected_ids: Vec<String> = runs_a.iter().chain(runs_b.iter()).cloned().collect();
    assert_eq!(matrix.ids(), expected_ids.as_slice());

    let embedding = pcoa(&matrix).unwrap();
    let frame = OrdinationFrame::study_comparison(&embedding, &pooled).unwrap();
    let studies: Vec<_> = frame
        .records()
        .iter()
        .map(|r| r.study.as_deref().unwrap())
        .collect();
    assert_eq!(
        studies,
        vec![
            "MGYS90001",
            "MGYS90001",
            "MGYS90001",
            "MGYS90001",
            "MGYS90002",
            "MGYS90002",
            "MGYS90002",
        ]
    );
    assert_eq!(
        frame.group_values(GroupBy::Study),
        vec!["MGYS90001", "MGYS90002"]
    );
}

#[test]
fn test_all_biomes_flow_joins_catalog() {
    let root = TempDir::new().unwrap();

    let abund_path = root.path().join("merged_abund.csv");
    let mut file = std::fs::File::create(&abund_path).unwrap();
    writeln!(file, "OTU,R1,R2,R3,R4").unwrap();
    writeln!(file, "Escherichia,400,390,5,4").unwrap();
    writeln!(file, "Bacillus,380,410,3,6").unwrap();
    writeln!(file, "Vibrio,4,6,420,395").unwrap();
    file.flush().unwrap();

    let run_ids: Vec<String> = (1..=4).map(|i| format!("R{}", i)).collect();
    let metadata = write_run_metadata(&root, "samples.csv", &run_ids);

    let studies_path = root.path().join("study_ids.csv");
    let mut file = std::fs::File::create(&studies_path).unwrap();
    writeln!(file, "assembly_run_ids,study_id").unwrap();
    writeln!(file, "R1,MGYS1").unwrap();
    writeln!(file, "R2,MGYS1").unwrap();
    writeln!(file, "R3,MGYS2").unwrap();
    writeln!(file, "R4,MGYS2").unwrap();
    file.flush().unwrap();
    let assignments = StudyAssignments::from_csv(&studies_path).unwrap();

    let catalog_path = root.path().join("studies_data.csv");
    let mut file = std::fs::File::create(&catalog_path).unwrap();
    writeln!(
        file,
        "study_id,biome,sampling_country,experiment_type,pipeline_version,instrument_platform"
    )
    .unwrap();
    writeln!(file, "MGYS1,Wastewater,Denmark,metagenomic,5.0,Illumina").unwrap();
    writeln!(file, "MGYS2,Marine,Norway,amplicon,4.1,Ion Torrent").unwrap();
    file.flush().unwrap();
    let catalog = StudyCatalog::from_csv(&catalog_path, &CatalogOptions::default()).unwrap();

    let table = AbundanceTable::from_csv(&abund_path).unwrap();
    let beta = beta_diversity_all_biomes(&table, &metadata).unwrap();
    let embedding = pcoa(&beta.matrix).unwrap();
    let frame =
        OrdinationFrame::all_biomes(&embedding, &beta.samples, &assignments, &catalog).unwrap();

    let first = &frame.records()[0];
    assert_eq!(first.study.as_deref(), Some("MGYS1"));
    assert_eq!(first.study_label.as_deref(), Some("MGYS1 - Wastewater"));
    assert_eq!(first.biome.as_deref(), Some("Wastewater"));
    assert_eq!(first.experiment_type.as_deref(), Some("Metagenomic"));
    let last = &frame.records()[3];
    assert_eq!(last.biome.as_deref(), Some("Marine"));
    assert_eq!(last.platform.as_deref(), Some("Ion Torrent"));
    assert_eq!(
        frame.group_values(GroupBy::Biome),
        vec!["Marine", "Wastewater"]
    );
}

const ASSOCIATION_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="d0" for="node" attr.name="name" attr.type="string"/>
  <key id="d1" for="node" attr.name="degree" attr.type="double"/>
  <key id="d2" for="node" attr.name="cluster" attr.type="long"/>
  <key id="d3" for="edge" attr.name="weight" attr.type="double"/>
  <graph edgedefault="undirected">
    <node id="n0">
      <data key="d0">Bacteroides</data>
      <data key="d1">0</data>
      <data key="d2">1</data>
    </node>
    <node id="n1">
      <data key="d0">Prevotella</data>
      <data key="d1">5</data>
      <data key="d2">2</data>
    </node>
    <node id="n2">
      <data key="d1">10</data>
    </node>
    <edge source="n0" target="n1">
      <data key="d3">0.83</data>
    </edge>
    <edge source="n1" target="n2">
      <data key="d3">0.41</data>
    </edge>
  </graph>
</graphml>"#;

#[test]
fn test_association_graph_flow_round_trip() {
    let mut network = read_graphml_str(ASSOCIATION_XML).unwrap();
    assert_eq!(network.n_nodes(), 3);
    assert_eq!(network.n_edges(), 2);

    style_association_network(&mut network, SizeRange::ASSOCIATION);
    assert_eq!(network.node("n0").unwrap().size, Some(6.0));
    assert_eq!(network.node("n1").unwrap().size, Some(18.0));
    assert_eq!(network.node("n2").unwrap().size, Some(30.0));
    assert_eq!(network.node("n0").unwrap().display_label(), "Bacteroides");
    assert_eq!(network.node("n2").unwrap().display_label(), "n2");
    assert!(network.node("n0").unwrap().color.is_some());
    assert!(network.node("n2").unwrap().color.is_none());

    let root = TempDir::new().unwrap();
    let out = root.path().join("styled.graphml");
    write_graphml(&network, &out).unwrap();
    let back = read_graphml(&out).unwrap();
    assert_eq!(back.n_nodes(), 3);
    assert_eq!(back.n_edges(), 2);
    assert!(!back.is_directed());
    let n1 = back.node("n1").unwrap();
    assert_eq!(n1.data["size"], "18");
    assert_eq!(n1.data["label"], "Prevotella");
    assert_eq!(
        back.edge_between("n0", "n1").unwrap().data["weight"],
        "0.83"
    );
}

const KNOWLEDGE_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<graphml xmlns="http://graphml.graphdrawing.org/xmlns">
  <key id="d0" for="node" attr.name="labels" attr.type="string"/>
  <key id="d1" for="node" attr.name="betweenness_centrality" attr.type="double"/>
  <key id="d2" for="edge" attr.name="label" attr.type="string"/>
  <graph edgedefault="directed">
    <node id="p1">
      <data key="d0">:Protein</data>
      <data key="d1">0.0</data>
    </node>
    <node id="p2">
      <data key="d0">:Protein</data>
      <data key="d1">0.5</data>
    </node>
    <node id="m1">
      <data key="d0">:Metabolite</data>
      <data key="d1">1.0</data>
    </node>
    <edge source="p1" target="p2">
      <data key="d2">INTERACTS_WITH</data>
    </edge>
  </graph>
</graphml>"#;

const STYLE_YAML: &str = r##"
kg_nodes:
  Protein:
    color: "#1f77b4"
    border-color: "#0b3d61"
  Metabolite:
    color: "#2ca02c"
    border-color: "#14501a"
kg_edges:
  INTERACTS_WITH:
    color: "#999999"
"##;

#[test]
fn test_knowledge_graph_flow_exports() {
    let config = DashboardConfig::from_yaml(STYLE_YAML).unwrap();
    let mut network = read_graphml_str(KNOWLEDGE_XML).unwrap();
    assert!(network.is_directed());

    style_knowledge_subgraph(
        &mut network,
        SizeRange::KNOWLEDGE,
        &config.kg_nodes,
        &config.kg_edges,
    );
    assert_eq!(network.node("p1").unwrap().size, Some(10.0));
    assert_eq!(network.node("p2").unwrap().size, Some(30.0));
    assert_eq!(network.node("m1").unwrap().size, Some(50.0));
    assert_eq!(network.node("p1").unwrap().color.as_deref(), Some("#1f77b4"));
    assert_eq!(network.node("m1").unwrap().color.as_deref(), Some("#2ca02c"));
    assert_eq!(network.node("p1").unwrap().display_label(), "Protein");

    let root = TempDir::new().unwrap();
    let edges_path = root.path().join("edges.csv");
    write_edge_list(&network, &edges_path).unwrap();
    let content = std::fs::read_to_string(&edges_path).unwrap();
    let mut lines = content.lines();
    assert_eq!(lines.next().unwrap(), "source,target,label,color");
    assert_eq!(lines.next().unwrap(), "p1,p2,INTERACTS_WITH,#999999");

    let json_path = root.path().join("graph.json");
    write_cytoscape_json(&network, &json_path).unwrap();
    let doc: Value =
        serde_json::from_str(&std::fs::read_to_string(&json_path).unwrap()).unwrap();
    assert_eq!(doc["directed"], Value::Bool(true));
    assert_eq!(doc["elements"]["nodes"].as_array().unwrap().len(), 3);
    assert_eq!(
        doc["elements"]["edges"][0]["data"]["source"],
        Value::String("p1".to_string())
    );
}

#[test]
fn test_cache_shares_loaded_tables() {
    let root = TempDir::new().unwrap();
    let runs = write_study_table(&root, "MGYS90001", "ERRA", 4);

    let cache = AnalysisCache::new();
    let load = || load_study_table(root.path(), "MGYS90001", TaxonomicRank::Genus);
    let first = cache
        .table_or_load(root.path().join("MGYS90001"), "genus", load)
        .unwrap();
    let second = cache
        .table_or_load(root.path().join("MGYS90001"), "genus", || {
            panic!("second lookup must hit the cache")
        })
        .unwrap();
    assert!(std::sync::Arc::ptr_eq(&first, &second));
    assert_eq!(first.sample_ids(), runs.as_slice());
    assert_eq!(cache.len(), 1);
}
