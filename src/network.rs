//! Road network and points of interest.
//!
//! The network is an undirected weighted graph whose nodes are identified by
//! their index in `0..node_count()`. Points of interest are node ids grouped
//! into the categories used by agent routines.

use anyhow::{Context, Result, bail};
use serde::{Deserialize, Serialize};
use std::{
    collections::BTreeSet,
    fs::File,
    io::BufReader,
    path::Path,
};

/// Planar position of a node (longitude, latitude).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coord {
    pub x: f64,
    pub y: f64,
}

impl Coord {
    pub fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }

    /// Euclidean distance in coordinate units.
    pub fn distance(&self, other: &Coord) -> f64 {
        (self.x - other.x).hypot(self.y - other.y)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
struct Edge {
    target: usize,
    weight: f64,
}

/// Undirected weighted street graph.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RoadNetwork {
    coords: Vec<Coord>,
    adjacency: Vec<Vec<Edge>>,
}

impl RoadNetwork {
    /// Create a network with the given node coordinates and no edges.
    pub fn new(coords: Vec<Coord>) -> Self {
        let adjacency = vec![Vec::new(); coords.len()];
        Self { coords, adjacency }
    }

    /// Add an undirected road between `a` and `b`.
    pub fn add_road(&mut self, a: usize, b: usize, weight: f64) -> Result<()> {
        let n_nodes = self.node_count();
        if a >= n_nodes || b >= n_nodes {
            bail!("road ({a}, {b}) references a node outside 0..{n_nodes}");
        }
        if !weight.is_finite() || weight < 0.0 {
            bail!("road ({a}, {b}) has invalid weight {weight}");
        }
        self.adjacency[a].push(Edge { target: b, weight });
        if a != b {
            self.adjacency[b].push(Edge { target: a, weight });
        }
        Ok(())
    }

    pub fn node_count(&self) -> usize {
        self.coords.len()
    }

    pub fn coordinates(&self, node: usize) -> Coord {
        self.coords[node]
    }

    pub fn degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    /// Neighbors of `node` with the weight of the connecting road.
    pub fn neighbors(&self, node: usize) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.adjacency[node].iter().map(|e| (e.target, e.weight))
    }
}

/// Node ids grouped by routine category.
///
/// Each list is sorted and free of duplicates.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PoiSets {
    pub work: Vec<usize>,
    pub education: Vec<usize>,
    pub leisure: Vec<usize>,
}

/// Raw POI lists as tagged on the map.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RawPois {
    #[serde(default)]
    pub schools: Vec<usize>,
    #[serde(default)]
    pub offices: Vec<usize>,
    #[serde(default)]
    pub shops: Vec<usize>,
    #[serde(default)]
    pub parks: Vec<usize>,
    #[serde(default)]
    pub restaurants: Vec<usize>,
    #[serde(default)]
    pub cafes: Vec<usize>,
    #[serde(default)]
    pub hotels: Vec<usize>,
}

impl RawPois {
    fn all(&self) -> impl Iterator<Item = (&'static str, &usize)> {
        [
            ("schools", &self.schools),
            ("offices", &self.offices),
            ("shops", &self.shops),
            ("parks", &self.parks),
            ("restaurants", &self.restaurants),
            ("cafes", &self.cafes),
            ("hotels", &self.hotels),
        ]
        .into_iter()
        .flat_map(|(name, ids)| ids.iter().map(move |id| (name, id)))
    }

    /// Merge raw categories into routine categories.
    pub fn categorize(&self) -> PoiSets {
        fn union(lists: &[&Vec<usize>]) -> Vec<usize> {
            let set: BTreeSet<usize> = lists.iter().flat_map(|l| l.iter().copied()).collect();
            set.into_iter().collect()
        }
        PoiSets {
            work: union(&[&self.offices, &self.shops]),
            education: union(&[&self.schools]),
            leisure: union(&[&self.parks, &self.restaurants, &self.cafes, &self.shops]),
        }
    }
}

/// Everything the simulation needs from the geographic data provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeoData {
    pub network: RoadNetwork,
    pub pois: PoiSets,
}

#[derive(Deserialize)]
struct NetworkFile {
    nodes: Vec<Coord>,
    #[serde(default)]
    edges: Vec<EdgeRecord>,
    #[serde(default)]
    pois: RawPois,
}

#[derive(Deserialize)]
struct EdgeRecord {
    source: usize,
    target: usize,
    #[serde(default)]
    weight: Option<f64>,
}

impl GeoData {
    /// Resolve `place` into geographic data.
    ///
    /// `grid:<rows>x<cols>` builds a synthetic street grid. Any other value
    /// names a JSON file `<data_dir>/<place>.json`.
    pub fn load<P: AsRef<Path>>(place: &str, data_dir: P) -> Result<Self> {
        if let Some(dims) = place.strip_prefix("grid:") {
            let (rows, cols) = parse_grid_dims(dims)
                .with_context(|| format!("invalid grid place {place:?}"))?;
            return Self::grid(rows, cols);
        }

        let file = data_dir.as_ref().join(format!("{place}.json"));
        Self::from_file(&file).with_context(|| format!("failed to load place {place:?}"))
    }

    /// Load geographic data from a JSON file.
    pub fn from_file<P: AsRef<Path>>(file: P) -> Result<Self> {
        let file = file.as_ref();
        let file = File::open(file).with_context(|| format!("failed to open {file:?}"))?;
        let reader = BufReader::new(file);

        let raw: NetworkFile =
            serde_json::from_reader(reader).context("failed to deserialize network")?;

        Self::from_parts(raw.nodes, raw.edges, raw.pois)
    }

    fn from_parts(nodes: Vec<Coord>, edges: Vec<EdgeRecord>, pois: RawPois) -> Result<Self> {
        if nodes.is_empty() {
            bail!("network must have at least one node");
        }
        if let Some((idx, _)) = nodes
            .iter()
            .enumerate()
            .find(|(_, c)| !c.x.is_finite() || !c.y.is_finite())
        {
            bail!("node {idx} has non-finite coordinates");
        }

        let mut network = RoadNetwork::new(nodes);
        for edge in edges {
            network.add_road(edge.source, edge.target, edge.weight.unwrap_or(1.0))?;
        }

        let n_nodes = network.node_count();
        let n_isolated = (0..n_nodes).filter(|&node| network.degree(node) == 0).count();
        if n_isolated > 0 {
            log::warn!("{n_isolated} of {n_nodes} nodes have no roads");
        }

        if let Some((category, id)) = pois.all().find(|&(_, &id)| id >= n_nodes) {
            bail!("{category} entry {id} references a node outside 0..{n_nodes}");
        }

        let geo = Self {
            pois: pois.categorize(),
            network,
        };
        log::info!(
            "loaded network with {} nodes, {} work, {} education and {} leisure nodes",
            geo.network.node_count(),
            geo.pois.work.len(),
            geo.pois.education.len(),
            geo.pois.leisure.len()
        );
        Ok(geo)
    }

    /// Build a `rows x cols` street grid.
    ///
    /// Rows run south to north and columns west to east. Roads connect
    /// horizontally and vertically adjacent nodes and are weighted by their
    /// length in metres. POIs are tagged on a fixed pattern of nodes.
    pub fn grid(rows: usize, cols: usize) -> Result<Self> {
        const LAT_MIN: f64 = 48.28;
        const LAT_STEP: f64 = 0.001;
        const LON_MIN: f64 = 14.26;
        const LON_STEP: f64 = 0.0015;
        const METRES_PER_DEGREE: f64 = 111_320.0;

        if rows == 0 || cols == 0 {
            bail!("grid must have at least one row and one column");
        }

        let mut nodes = Vec::with_capacity(rows * cols);
        for row in 0..rows {
            for col in 0..cols {
                let lat = LAT_MIN + row as f64 * LAT_STEP;
                let lon = LON_MIN + col as f64 * LON_STEP;
                nodes.push(Coord::new(lon, lat));
            }
        }

        let mut edges = Vec::with_capacity(2 * rows * cols);
        for row in 0..rows {
            // East-west distance shrinks with latitude.
            let lat_rad = (LAT_MIN + row as f64 * LAT_STEP).to_radians();
            let dist_m = LON_STEP * lat_rad.cos() * METRES_PER_DEGREE;
            for col in 0..cols - 1 {
                edges.push(EdgeRecord {
                    source: row * cols + col,
                    target: row * cols + col + 1,
                    weight: Some(dist_m),
                });
            }
        }
        let dist_m = LAT_STEP * METRES_PER_DEGREE;
        for row in 0..rows - 1 {
            for col in 0..cols {
                edges.push(EdgeRecord {
                    source: row * cols + col,
                    target: (row + 1) * cols + col,
                    weight: Some(dist_m),
                });
            }
        }

        let n_nodes = rows * cols;
        let tagged = |period: usize, offset: usize| -> Vec<usize> {
            (offset..n_nodes).step_by(period).collect()
        };
        let pois = RawPois {
            schools: tagged(17, 3),
            offices: tagged(7, 1),
            shops: tagged(11, 5),
            parks: tagged(19, 9),
            restaurants: tagged(13, 2),
            cafes: tagged(23, 4),
            hotels: tagged(29, 6),
        };

        Self::from_parts(nodes, edges, pois)
    }
}

fn parse_grid_dims(dims: &str) -> Result<(usize, usize)> {
    let (rows, cols) = dims
        .split_once('x')
        .context("expected dimensions as <rows>x<cols>")?;
    let rows = rows.trim().parse().context("failed to parse rows")?;
    let cols = cols.trim().parse().context("failed to parse cols")?;
    Ok((rows, cols))
}
