//! Text formats for trained networks
//!
//! `v2` stores every layer's id, neuron count and outgoing weights, one value
//! per line. The legacy `.bnn` format stores the learning rate, `;`-separated
//! neuron counts and activations, then one line of space-separated weights per
//! non-terminal layer. Weights are flattened row-major in both: source unit
//! (bias row last) major, destination unit minor.
//!
//! Floats use Rust's shortest round-trip formatting, so `load(save(n))`
//! reproduces weights bit for bit.

use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Read, Write};
use std::path::Path;
use std::str::FromStr;

use log::info;
use ndarray::Array2;

use crate::activation::ActivationType;
use crate::error::{Error, Result};
use crate::hyperparameters::ModelHyperparameters;
use crate::layer::Layer;
use crate::network::Network;

const V2_HEADER: &str = "v2";

/// Upper bound on capacity reserved from counts read out of a file
const RESERVE_LIMIT: usize = 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelFormat {
    V2,
    Bnn,
}

impl ModelFormat {
    /// `.bnn` files use the legacy format, anything else `v2`
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|e| e.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("bnn") => ModelFormat::Bnn,
            _ => ModelFormat::V2,
        }
    }
}

impl Network {
    /// Writes the network to `path`, picking the format from the extension
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        let mut writer = BufWriter::new(File::create(path)?);
        match ModelFormat::from_path(path) {
            ModelFormat::V2 => write_v2(self, &mut writer)?,
            ModelFormat::Bnn => write_bnn(self, &mut writer)?,
        }
        writer.flush()?;
        info!("saved network to {}", path.display());
        Ok(())
    }

    /// Reads a network written by [`save`](Network::save)
    ///
    /// `defaults` supplies the learning rate and activation that `v2` files
    /// don't record.
    pub fn load(path: impl AsRef<Path>, defaults: &ModelHyperparameters) -> Result<Network> {
        let path = path.as_ref();
        let network = read(BufReader::new(File::open(path)?), defaults)?;
        info!("loaded network from {}", path.display());
        Ok(network)
    }
}

pub fn write_v2<W: Write>(network: &Network, writer: &mut W) -> Result<()> {
    if !network.is_built() {
        return Err(Error::NotBuilt);
    }
    let chain: Vec<&Layer> = network.chain().collect();

    writeln!(writer, "{V2_HEADER}")?;
    writeln!(writer, "{}", chain.len())?;
    for layer in chain {
        writeln!(writer, "{}", layer.id())?;
        writeln!(writer, "{}", layer.neurons())?;
        if let Some(weights) = layer.weights() {
            writeln!(writer, "{}", weights.ncols())?;
            for w in weights.iter() {
                writeln!(writer, "{w}")?;
            }
        }
    }
    Ok(())
}

pub fn write_bnn<W: Write>(network: &Network, writer: &mut W) -> Result<()> {
    if !network.is_built() {
        return Err(Error::NotBuilt);
    }
    let chain: Vec<&Layer> = network.chain().collect();

    let sizes: Vec<String> = chain.iter().map(|l| l.neurons().to_string()).collect();
    let activations: Vec<String> = chain.iter().map(|l| l.activation().to_string()).collect();
    writeln!(writer, "{}", network.learning_rate())?;
    writeln!(writer, "{}", sizes.join(";"))?;
    writeln!(writer, "{}", activations.join(";"))?;
    for weights in chain.iter().filter_map(|l| l.weights()) {
        let line: Vec<String> = weights.iter().map(f64::to_string).collect();
        writeln!(writer, "{}", line.join(" "))?;
    }
    Ok(())
}

/// Reads either format, telling them apart by the `v2` header line
pub fn read<R: BufRead>(mut reader: R, defaults: &ModelHyperparameters) -> Result<Network> {
    let mut first = String::new();
    reader.read_line(&mut first)?;
    let is_v2 = first.trim() == V2_HEADER;
    let reader = io::Cursor::new(first.into_bytes()).chain(reader);

    if is_v2 {
        read_v2(reader, defaults)
    } else {
        read_bnn(reader)
    }
}

struct LayerRecord {
    id: String,
    neurons: usize,
    /// Declared width of the next layer and the line it was declared on
    next: Option<(usize, usize)>,
    weights: Vec<f64>,
}

pub fn read_v2<R: BufRead>(reader: R, defaults: &ModelHyperparameters) -> Result<Network> {
    let activation = defaults.activation()?;
    let mut lines = NumberedLines::new(reader);

    let header = lines.next_line("the `v2` header")?;
    if header.trim() != V2_HEADER {
        return Err(Error::format(lines.number, format!("expected `{V2_HEADER}` header")));
    }
    let count: usize = lines.parse("the layer count")?;
    if count < 2 {
        return Err(Error::format(lines.number, "a network needs at least two layers"));
    }

    let mut records: Vec<LayerRecord> = Vec::with_capacity(count.min(RESERVE_LIMIT));
    for position in 0..count {
        let id = lines.next_line("a layer id")?.trim().to_string();
        let taken = records.iter().any(|r| r.id == id);
        if id.is_empty() || id.contains(char::is_whitespace) || taken {
            return Err(Error::format(
                lines.number,
                format!("bad or repeated layer id `{id}`"),
            ));
        }
        let neurons: usize = lines.parse("a neuron count")?;
        if neurons == 0 {
            return Err(Error::format(lines.number, "a layer needs at least one neuron"));
        }

        let mut record = LayerRecord {
            id,
            neurons,
            next: None,
            weights: Vec::new(),
        };
        if position + 1 < count {
            let next: usize = lines.parse("the next layer's neuron count")?;
            record.next = Some((next, lines.number));
            let expected = weight_count(neurons, next, lines.number)?;
            record.weights.reserve(expected.min(RESERVE_LIMIT));
            for _ in 0..expected {
                record.weights.push(lines.parse("a weight")?);
            }
        }
        records.push(record);
    }
    lines.expect_end()?;

    for pair in records.windows(2) {
        if let Some((declared, line)) = pair[0].next {
            if declared != pair[1].neurons {
                return Err(Error::format(
                    line,
                    format!(
                        "layer `{}` declares {declared} outputs but `{}` has {} neurons",
                        pair[0].id, pair[1].id, pair[1].neurons
                    ),
                ));
            }
        }
    }

    let mut specs = Vec::with_capacity(records.len());
    let mut matrices = Vec::with_capacity(records.len() - 1);
    for record in records {
        if let Some((cols, _)) = record.next {
            matrices.push((record.neurons + 1, cols, record.weights));
        }
        specs.push((record.id, record.neurons, activation));
    }
    assemble(defaults.learning_rate, specs, matrices)
}

pub fn read_bnn<R: BufRead>(reader: R) -> Result<Network> {
    let mut lines = NumberedLines::new(reader);

    let learning_rate: f64 = lines.parse("the learning rate")?;

    let sizes = lines
        .next_line("the layer sizes")?
        .split(';')
        .map(|s| s.trim().parse::<usize>())
        .collect::<std::result::Result<Vec<_>, _>>()
        .map_err(|e| Error::format(lines.number, format!("bad layer size: {e}")))?;
    if sizes.len() < 2 || sizes.contains(&0) {
        return Err(Error::format(
            lines.number,
            "need at least two layers, each with at least one neuron",
        ));
    }

    let activations = lines
        .next_line("the activation functions")?
        .split(';')
        .map(ActivationType::from_str)
        .collect::<Result<Vec<_>>>()?;
    let activations = match activations.len() {
        1 => vec![activations[0]; sizes.len()],
        n if n == sizes.len() => activations,
        n => {
            return Err(Error::format(
                lines.number,
                format!("{} layers but {n} activation functions", sizes.len()),
            ))
        }
    };

    let mut matrices = Vec::with_capacity(sizes.len() - 1);
    for pair in sizes.windows(2) {
        let line = lines.next_line("a line of weights")?;
        let expected = weight_count(pair[0], pair[1], lines.number)?;
        let (rows, cols) = (pair[0] + 1, pair[1]);
        let weights = line
            .split_whitespace()
            .map(str::parse::<f64>)
            .collect::<std::result::Result<Vec<_>, _>>()
            .map_err(|e| Error::format(lines.number, format!("bad weight: {e}")))?;
        if weights.len() != expected {
            return Err(Error::format(
                lines.number,
                format!("expected {expected} weights, found {}", weights.len()),
            ));
        }
        matrices.push((rows, cols, weights));
    }
    lines.expect_end()?;

    let specs = sizes
        .iter()
        .zip(activations)
        .enumerate()
        .map(|(i, (&neurons, activation))| (format!("l{}", i + 1), neurons, activation))
        .collect();
    assemble(learning_rate, specs, matrices)
}

/// `(neurons + 1) * next`, or a format error at `line` when it overflows
fn weight_count(neurons: usize, next: usize, line: usize) -> Result<usize> {
    neurons
        .checked_add(1)
        .and_then(|rows| rows.checked_mul(next))
        .ok_or_else(|| {
            Error::format(line, format!("{neurons}x{next} layer is too large"))
        })
}

/// Turns validated records into a built network chained in record order
fn assemble(
    learning_rate: f64,
    specs: Vec<(String, usize, ActivationType)>,
    matrices: Vec<(usize, usize, Vec<f64>)>,
) -> Result<Network> {
    let mut network = Network::new(learning_rate);
    let mut ids = Vec::with_capacity(specs.len());
    for (id, neurons, activation) in specs {
        network.add_layer(Layer::new(id.clone(), neurons, activation)?)?;
        ids.push(id);
    }

    let weights = matrices
        .into_iter()
        .map(|(rows, cols, values)| {
            Array2::from_shape_vec((rows, cols), values)
                .map_err(|e| Error::format(0, format!("weights don't fit {rows}x{cols}: {e}")))
        })
        .collect::<Result<Vec<_>>>()?;

    let order: Vec<usize> = (0..ids.len()).collect();
    network.set_input(&ids[0])?;
    network.set_output(&ids[ids.len() - 1])?;
    network.wire(&order, weights)?;
    network.build()?;
    Ok(network)
}

/// Line reader that remembers the 1-based number of the last line handed out
struct NumberedLines<R> {
    lines: io::Lines<R>,
    number: usize,
}

impl<R: BufRead> NumberedLines<R> {
    fn new(reader: R) -> Self {
        NumberedLines {
            lines: reader.lines(),
            number: 0,
        }
    }

    fn next_line(&mut self, what: &str) -> Result<String> {
        match self.lines.next() {
            Some(line) => {
                self.number += 1;
                Ok(line?)
            }
            None => Err(Error::format(
                self.number + 1,
                format!("unexpected end of file, expected {what}"),
            )),
        }
    }

    fn parse<T>(&mut self, what: &str) -> Result<T>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        let line = self.next_line(what)?;
        line.trim()
            .parse()
            .map_err(|e| Error::format(self.number, format!("expected {what}: {e}")))
    }

    /// Only blank lines may follow the model
    fn expect_end(&mut self) -> Result<()> {
        for line in self.lines.by_ref() {
            self.number += 1;
            if !line?.trim().is_empty() {
                return Err(Error::format(self.number, "unexpected trailing content"));
            }
        }
        Ok(())
    }
}
