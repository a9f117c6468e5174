//! an executable training embeddings for several seeds and screening their stability
//! example usage:
//! stability --csv "ppi_edges.txt" --seeds 0,1,2 --outdir ppi_screen n2v --dim 64 --epochs 20
//! stability --csv "ppi_edges.txt" --features "ppi_features.txt" --linkage average --affinity cosine gae --latent 16 --split link
//!
//! For each seed the embedding of all nodes is dumped in outdir/latents_seed_{seed}.csv,
//! each pair (i,j) of seeds gets its AMI matrix in outdir/ami_{i}_{j}.csv and all matrices are drawn
//! in outdir/ami_matrices.svg.

use std::path::{Path, PathBuf};
use std::str::FromStr;

use anyhow::anyhow;
use clap::{arg, Arg, ArgMatches, Command};

use graphstab::embed::gae::{GaeModel, GraphAutoEncoder};
use graphstab::io::csv::{dump_latents_csv, dump_matrix_csv, edge_list_from_csv_any, features_from_csv, EdgeList, DELIMITERS};
use graphstab::prelude::*;

/// reads an optional argument, returning default if absent
fn parse_or<T: FromStr>(matches: &ArgMatches, name: &str, default: T) -> anyhow::Result<T> {
    match matches.value_of(name) {
        Some(str) => match str.parse::<T>() {
            Ok(val) => Ok(val),
            Err(_) => {
                log::error!("could not parse argument {}, got {}", name, str);
                Err(anyhow!("error parsing {}", name))
            }
        },
        None => Ok(default),
    }
} // end of parse_or

fn parse_seeds(matches: &ArgMatches) -> anyhow::Result<Vec<u64>> {
    let str = matches.value_of("seeds").unwrap_or("0,1,2");
    let seeds = str
        .split(',')
        .map(|s| s.trim().parse::<u64>())
        .collect::<Result<Vec<u64>, _>>()
        .map_err(|_| anyhow!("error parsing seeds {}", str))?;
    if seeds.is_empty() {
        return Err(anyhow!("no seed given"));
    }
    Ok(seeds)
}

fn parse_n2v_args(matches: &ArgMatches) -> anyhow::Result<Node2VecParams> {
    log::debug!("in parse_n2v_args");
    let default = Node2VecParams::default();
    Ok(Node2VecParams {
        embedding_dim: parse_or(matches, "dim", default.embedding_dim)?,
        walk_length: parse_or(matches, "walk_length", default.walk_length)?,
        context_size: parse_or(matches, "context_size", default.context_size)?,
        walks_per_node: parse_or(matches, "walks_per_node", default.walks_per_node)?,
        p: parse_or(matches, "p", default.p)?,
        q: parse_or(matches, "q", default.q)?,
        lr: parse_or(matches, "lr", default.lr)?,
        n_epochs: parse_or(matches, "epochs", default.n_epochs)?,
        ..default
    })
} // end of parse_n2v_args

/// returns encoder hidden dim, latent dim and training params
fn parse_gae_args(matches: &ArgMatches) -> anyhow::Result<(usize, usize, GaeTrainParams)> {
    log::debug!("in parse_gae_args");
    let default = GaeTrainParams::default();
    let split_type = match matches.value_of("split") {
        None | Some("none") => None,
        Some("link") => Some(SplitType::Link),
        Some("node") => Some(SplitType::Node),
        Some(other) => {
            log::error!("split must be none, link or node, got {}", other);
            return Err(anyhow!("could not parse split type"));
        }
    };
    let params = GaeTrainParams {
        split_type,
        lr: parse_or(matches, "lr", default.lr)?,
        weight_decay: parse_or(matches, "weight_decay", default.weight_decay)?,
        n_epochs: parse_or(matches, "epochs", default.n_epochs)?,
        early_stopping: parse_or(matches, "patience", default.early_stopping)?,
        neg_edge_ratio: parse_or(matches, "neg_ratio", default.neg_edge_ratio)?,
        use_full_graph: matches.is_present("full_graph"),
        use_edge_weight: matches.is_present("weighted"),
        ..default
    };
    let hidden = parse_or(matches, "hidden", 32)?;
    let latent = parse_or(matches, "latent", 16)?;
    Ok((hidden, latent, params))
} // end of parse_gae_args

/// node features, trying each delimiter in turn
fn load_features(path: &Path, edges: &EdgeList) -> anyhow::Result<ndarray::Array2<f64>> {
    let mut res: anyhow::Result<ndarray::Array2<f64>> = Err(anyhow!("no delimiter tried"));
    for delim in DELIMITERS {
        res = features_from_csv(path, delim, &edges.nodes);
        if res.is_ok() {
            break;
        }
        log::debug!("features reading with delimiter {:?} failed", delim as char);
    }
    res
}

fn load_graph(matches: &ArgMatches) -> anyhow::Result<(EdgeList, GraphSample)> {
    let csv_file = match matches.value_of("csvfile") {
        Some(str) if !str.is_empty() => PathBuf::from(str),
        _ => return Err(anyhow!("expecting a csv file")),
    };
    log::info!("input file : {:?}", csv_file);
    let directed = matches.is_present("directed");
    let edges = edge_list_from_csv_any(&csv_file, directed)?;
    let graph = match matches.value_of("features") {
        Some(str) => {
            let features = load_features(Path::new(str), &edges)?;
            GraphSample::new(features, edges.edges.clone())?
        }
        None => GraphSample::featureless(edges.get_nb_nodes(), edges.edges.clone())?,
    };
    let graph = match &edges.weights {
        Some(weights) => graph.with_edge_weight(weights.clone())?,
        None => graph,
    };
    log::info!(
        "graph loaded : {} nodes, {} edges, {} features",
        graph.get_nb_nodes(),
        graph.get_nb_edges(),
        graph.get_nb_features()
    );
    Ok((edges, graph))
} // end of load_graph

fn run(matches: &ArgMatches) -> anyhow::Result<()> {
    let seeds = parse_seeds(matches)?;
    let outdir = PathBuf::from(matches.value_of("outdir").unwrap_or("."));
    std::fs::create_dir_all(&outdir)?;
    let cluster_params = ClusterParams::new(
        Affinity::from_str(matches.value_of("affinity").unwrap_or("euclidean"))?,
        Linkage::from_str(matches.value_of("linkage").unwrap_or("average"))?,
    );
    let n_max_clusters = parse_or(matches, "nclusters", DEFAULT_MAX_CLUSTERS)?;
    let metric = if matches.is_present("ari") {
        AgreementMetric::AdjustedRand
    } else {
        AgreementMetric::AdjustedMutualInfo
    };
    let plot_loss = if matches.is_present("plot_loss") {
        Some(outdir.clone())
    } else {
        None
    };
    let (edges, graph) = load_graph(matches)?;
    //
    let latents_dict = match matches.subcommand() {
        Some(("n2v", sub_m)) => {
            log::info!("embedding mode : Node2Vec");
            let params = parse_n2v_args(sub_m)?;
            n2v_latents_for_seeds(&graph, &seeds, &params, plot_loss.as_deref())?
        }
        Some(("gae", sub_m)) => {
            log::info!("embedding mode : graph autoencoder");
            let (hidden, latent, mut params) = parse_gae_args(sub_m)?;
            params.plot_loss = plot_loss;
            let mut model = GaeModel::new(GraphAutoEncoder::new(graph.get_nb_features(), hidden, latent));
            let (latents_dict, _) = gae_latents_for_seeds(&graph, &mut model, &seeds, &params, None)?;
            latents_dict
        }
        _ => {
            log::error!("expected subcommand n2v or gae");
            return Err(anyhow!("expected subcommand n2v or gae"));
        }
    };
    //
    for (seed, latents) in &latents_dict {
        dump_latents_csv(latents, Some(&edges.nodes), &outdir.join(format!("latents_seed_{}.csv", seed)))?;
        let drops = rank_difference_dict(&latents.view(), graphstab::stability::rank::RANK_TOL);
        log::info!("seed {} : {} nodes whose removal lowers latent rank", seed, drops.len());
    }
    let amis = stability_cocluster_screen(&latents_dict, &cluster_params, n_max_clusters, metric)?;
    let nb_seeds = latents_dict.len();
    for (k, ami) in amis.iter().enumerate() {
        let path = outdir.join(format!("ami_{}_{}.csv", k / nb_seeds, k % nb_seeds));
        dump_matrix_csv(ami, &path)?;
    }
    let names: Vec<String> = latents_dict.keys().map(|seed| format!("seed {}", seed)).collect();
    plot_ami_matrices(&names, &amis, &outdir.join("ami_matrices.svg"))?;
    log::info!("results written in {:?}", outdir);
    Ok(())
} // end of run

pub fn main() {
    //
    graphstab::log_init();
    log::info!("logger initialized");
    //
    let matches = Command::new("stability")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(Arg::new("csvfile")
            .long("csv")
            .takes_value(true)
            .required(true)
            .help("expecting a csv file with an edge list"))
        .arg(Arg::new("features")
            .long("features")
            .takes_value(true)
            .required(false)
            .help("csv file of node features, first field is the node name"))
        .arg(Arg::new("directed")
            .long("directed")
            .help("do not symmetrize edges"))
        .arg(Arg::new("seeds")
            .long("seeds")
            .takes_value(true)
            .help("comma separated list of seeds, default 0,1,2"))
        .arg(Arg::new("outdir")
            .long("outdir")
            .takes_value(true)
            .help("output directory, default ."))
        .args(&[
            arg!(--affinity [affinity] "euclidean, manhattan or cosine"),
            arg!(--linkage [linkage] "single, complete, average or ward, default average"),
            arg!(--nclusters [nclusters] "maximum number of clusters, default 15"),
        ])
        .arg(Arg::new("ari")
            .long("ari")
            .help("score agreement with adjusted rand index instead of adjusted mutual information"))
        .arg(Arg::new("plot_loss")
            .long("plot_loss")
            .help("plot loss of each seed in outdir"))
        .subcommand(Command::new("n2v")
            .args(&[
                arg!(-d --dim [dim] "the embedding dimension"),
                arg!(--walk_length [walk_length] "number of steps of a walk"),
                arg!(--context_size [context_size] "window size"),
                arg!(--walks_per_node [walks_per_node] "number of walks starting at each node"),
                arg!(-p [p] "return parameter"),
                arg!(-q [q] "in-out parameter"),
                arg!(--lr [lr] "learning rate"),
                arg!(--epochs [epochs] "number of epochs"),
            ])
        )
        .subcommand(Command::new("gae")
            .args(&[
                arg!(--hidden [hidden] "hidden dimension of encoder, default 32"),
                arg!(--latent [latent] "latent dimension, default 16"),
                arg!(--lr [lr] "learning rate"),
                arg!(--weight_decay [weight_decay] "weight decay"),
                arg!(--epochs [epochs] "maximum number of epochs"),
                arg!(--patience [patience] "early stopping patience"),
                arg!(--neg_ratio [neg_ratio] "negative edges by positive edge"),
                arg!(--split [split] "none, link or node"),
            ])
            .arg(Arg::new("full_graph")
                .long("full_graph")
                .help("message passing on the full graph in all splits"))
            .arg(Arg::new("weighted")
                .long("weighted")
                .help("use edge weights in GCN normalization"))
        )
    .get_matches();
    //
    if let Err(e) = run(&matches) {
        log::error!("error : {:?}", e);
        log::error!("stability screen failed");
        std::process::exit(1);
    }
} // end of main
