//! Load a graph (edge list, node features) from csv files and dump latents and matrices to csv.
//!
//! Edge list files have lines `node_a delim node_b [delim weight]`, lines beginning with # or %
//! are comments (see the snap data sets <https://snap.stanford.edu/data/index.html>).
//! Node names are kept as strings and indexed in order of first appearance.

use std::fs::OpenOptions;
use std::io::{BufRead, BufReader};
use std::path::Path;

use anyhow::anyhow;
use csv::{ReaderBuilder, StringRecord, WriterBuilder};
use indexmap::IndexSet;
use ndarray::Array2;

use crate::graph::{EdgePair, GraphSample};

/// node names, rank in set is the node index
pub type NodeIndexation = IndexSet<String>;

/// delimiters tried by [edge_list_from_csv_any]
pub const DELIMITERS: [u8; 3] = [b'\t', b',', b' '];

/// edges read from a csv file
#[derive(Clone, Debug)]
pub struct EdgeList {
    pub edges: Vec<EdgePair>,
    /// present if all records have a third field
    pub weights: Option<Vec<f64>>,
    pub nodes: NodeIndexation,
}

impl EdgeList {
    pub fn get_nb_nodes(&self) -> usize {
        self.nodes.len()
    }

    /// featureless graph sample of the edge list, weights attached if present
    pub fn to_graph_sample(&self) -> anyhow::Result<GraphSample> {
        let sample = GraphSample::featureless(self.nodes.len(), self.edges.clone())?;
        match &self.weights {
            Some(weights) => sample.with_edge_weight(weights.clone()),
            None => Ok(sample),
        }
    }
} // end of impl EdgeList

/// reads the file, dropping comment and blank lines
fn uncommented_content(filepath: &Path) -> anyhow::Result<String> {
    let file = match OpenOptions::new().read(true).open(filepath) {
        Ok(file) => file,
        Err(e) => {
            log::error!("could not open file {:?}", filepath.as_os_str());
            return Err(anyhow!("could not open file {} : {}", filepath.display(), e));
        }
    };
    let mut content = String::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim_start();
        if trimmed.is_empty() || trimmed.starts_with('#') || trimmed.starts_with('%') {
            continue;
        }
        content.push_str(line.trim_end());
        content.push('\n');
    }
    Ok(content)
}

fn get_field(record: &StringRecord, k: usize, nb_record: usize) -> anyhow::Result<&str> {
    match record.get(k) {
        Some(f) if !f.trim().is_empty() => Ok(f.trim()),
        _ => Err(anyhow!("missing field {} in record {}", k + 1, nb_record + 1)),
    }
}

/// Loads an edge list. If directed is false each edge (a,b) with a != b also gets its reverse (b,a)
/// and a pair listed in both directions (or repeated) is loaded once.
pub fn edge_list_from_csv(filepath: &Path, delim: u8, directed: bool) -> anyhow::Result<EdgeList> {
    log::info!("edge_list_from_csv reading {:?}", filepath);
    let content = uncommented_content(filepath)?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(delim)
        .flexible(false)
        .has_headers(false)
        .from_reader(content.as_bytes());
    //
    let mut nodes = NodeIndexation::new();
    let mut edges = Vec::<EdgePair>::new();
    let mut weights = Vec::<f64>::new();
    let mut seen = IndexSet::<EdgePair>::new();
    let mut nb_fields = 0;
    for (nb_record, result) in rdr.records().enumerate() {
        let record = result?;
        if nb_record == 0 {
            nb_fields = record.len();
            if nb_fields < 2 || nb_fields > 3 {
                log::error!("edge_list_from_csv : first record has {} fields", nb_fields);
                return Err(anyhow!("expecting 2 or 3 fields, first record has {}", nb_fields));
            }
        }
        let a = nodes.insert_full(String::from(get_field(&record, 0, nb_record)?)).0;
        let b = nodes.insert_full(String::from(get_field(&record, 1, nb_record)?)).0;
        let w = if nb_fields == 3 {
            match get_field(&record, 2, nb_record)?.parse::<f64>() {
                Ok(w) => Some(w),
                Err(_) => return Err(anyhow!("error decoding weight of record {}", nb_record + 1)),
            }
        } else {
            None
        };
        if directed {
            edges.push((a, b));
            if let Some(w) = w {
                weights.push(w);
            }
            continue;
        }
        // an undirected pair is kept once, with the weight of its first record
        let key = (a.min(b), a.max(b));
        if !seen.insert(key) {
            log::trace!("edge_list_from_csv : pair {:?} already loaded, record {}", key, nb_record + 1);
            continue;
        }
        edges.push((a, b));
        if let Some(w) = w {
            weights.push(w);
        }
        if a != b {
            edges.push((b, a));
            if let Some(w) = w {
                weights.push(w);
            }
        }
    }
    log::info!(
        "edge_list_from_csv : {} nodes, {} edges, weighted : {}",
        nodes.len(),
        edges.len(),
        nb_fields == 3
    );
    Ok(EdgeList {
        edges,
        weights: if nb_fields == 3 { Some(weights) } else { None },
        nodes,
    })
} // end of edge_list_from_csv

/// tries each delimiter of [DELIMITERS] in turn
pub fn edge_list_from_csv_any(filepath: &Path, directed: bool) -> anyhow::Result<EdgeList> {
    let mut res: anyhow::Result<EdgeList> = Err(anyhow!("no delimiter tried"));
    for delim in DELIMITERS {
        log::debug!("trying reading {:?} with delimiter {:?}", filepath, delim as char);
        res = edge_list_from_csv(filepath, delim, directed);
        match &res {
            Ok(list) if !list.edges.is_empty() => break,
            Ok(_) => {}
            Err(e) => log::debug!("delimiter {:?} failed : {}", delim as char, e),
        }
    }
    if res.is_err() {
        log::error!("edge_list_from_csv_any failed reading {:?}", filepath);
    }
    res
}

/// Loads node features, lines `node delim f_1 ... f_k`, rows ordered as in nodes.
/// Every node must have a line.
pub fn features_from_csv(filepath: &Path, delim: u8, nodes: &NodeIndexation) -> anyhow::Result<Array2<f64>> {
    let content = uncommented_content(filepath)?;
    let mut rdr = ReaderBuilder::new()
        .delimiter(delim)
        .flexible(false)
        .has_headers(false)
        .from_reader(content.as_bytes());
    let mut rows: Vec<Option<Vec<f64>>> = vec![None; nodes.len()];
    let mut nb_features = 0;
    for (nb_record, result) in rdr.records().enumerate() {
        let record = result?;
        let name = record.get(0).map(|s| s.trim()).unwrap_or("");
        let rank = match nodes.get_index_of(name) {
            Some(rank) => rank,
            None => {
                log::warn!("features_from_csv : unknown node {} at record {}", name, nb_record + 1);
                continue;
            }
        };
        let values = record
            .iter()
            .skip(1)
            .map(|f| f.trim().parse::<f64>())
            .collect::<Result<Vec<f64>, _>>()
            .map_err(|e| anyhow!("error decoding features of record {} : {}", nb_record + 1, e))?;
        nb_features = values.len();
        rows[rank] = Some(values);
    }
    let mut features = Array2::<f64>::zeros((nodes.len(), nb_features));
    for (rank, row) in rows.into_iter().enumerate() {
        match row {
            Some(values) => {
                for (j, v) in values.into_iter().enumerate() {
                    features[[rank, j]] = v;
                }
            }
            None => {
                log::error!("features_from_csv : no features for node {:?}", nodes.get_index(rank));
                return Err(anyhow!("no features for node {:?}", nodes.get_index(rank)));
            }
        }
    }
    Ok(features)
} // end of features_from_csv

/// Dumps latents, one line by node : node name (or rank) then coordinates. No header.
pub fn dump_latents_csv(latents: &Array2<f64>, nodes: Option<&NodeIndexation>, filepath: &Path) -> anyhow::Result<()> {
    if let Some(nodes) = nodes {
        if nodes.len() != latents.nrows() {
            return Err(anyhow!("{} node names for {} rows", nodes.len(), latents.nrows()));
        }
    }
    let mut writer = WriterBuilder::new().has_headers(false).from_path(filepath)?;
    for (rank, row) in latents.rows().into_iter().enumerate() {
        let name = match nodes.and_then(|n| n.get_index(rank)) {
            Some(name) => name.clone(),
            None => rank.to_string(),
        };
        let mut record = Vec::<String>::with_capacity(row.len() + 1);
        record.push(name);
        record.extend(row.iter().map(|v| v.to_string()));
        writer.write_record(&record)?;
    }
    writer.flush()?;
    log::debug!("dump_latents_csv wrote {:?}", filepath);
    Ok(())
}

/// dumps a matrix, one line by row, no header
pub fn dump_matrix_csv(mat: &Array2<f64>, filepath: &Path) -> anyhow::Result<()> {
    let mut writer = WriterBuilder::new().has_headers(false).from_path(filepath)?;
    for row in mat.rows() {
        writer.write_record(row.iter().map(|v| v.to_string()))?;
    }
    writer.flush()?;
    Ok(())
}

//========================================================================================

// end of mod tests
