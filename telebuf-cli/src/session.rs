//! Synthetic recording session: a damped pendulum ticking into a shared buffer while
//! consumer threads watch it through linked handles.

use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{anyhow, Context, Result};
use crossbeam_channel::{bounded, Receiver, RecvTimeoutError};
use log::{debug, info};

use telebuf_common::common_config::CONFIG;
use telebuf_common::export::{export_buffer, ArrowExporter};
use telebuf_common::{
    BufferProcessor, LinkedBufferFactory, LinkedVariableFactory, Registry, SharedBuffer, Value,
    Variable, VariableKind,
};

const GRAVITY: f64 = 9.81;
const LENGTH: f64 = 1.0;
const DT: f64 = 0.001;
const PHASES: [&str; 2] = ["SWING_LEFT", "SWING_RIGHT"];

pub struct RecordOptions {
    pub ticks: usize,
    pub size: Option<usize>,
    pub consumers: usize,
    pub playback_ticks: usize,
    pub realtime: bool,
}

#[derive(Debug, Default)]
pub struct ConsumerReport {
    pub pulls: u64,
    pub samples: u64,
    pub largest_window: usize,
    pub pushes: u64,
}

#[derive(Debug)]
pub struct RecordReport {
    pub ticks: usize,
    pub variables: usize,
    pub buffer_size: usize,
    pub active_length: usize,
    pub frame_bytes: usize,
    pub pushes_applied: u64,
    pub consumers: Vec<ConsumerReport>,
    pub final_q: f64,
}

struct Pendulum {
    q: Arc<Variable>,
    qd: Arc<Variable>,
    damping: Arc<Variable>,
    tick: Arc<Variable>,
    phase: Arc<Variable>,
    saturated: Arc<Variable>,
}

impl Pendulum {
    fn new(root: &Registry) -> Result<Self> {
        let registry = root.add_child("pendulum")?;
        let pendulum = Pendulum {
            q: registry.add_variable("q", VariableKind::Double)?,
            qd: registry.add_variable("qd", VariableKind::Double)?,
            damping: registry.add_variable("damping", VariableKind::Double)?,
            tick: registry.add_variable("tick", VariableKind::Long)?,
            phase: registry.add_variable("phase", VariableKind::enumeration(PHASES, false)?)?,
            saturated: registry.add_variable("saturated", VariableKind::Bool)?,
        };
        pendulum.q.set_value(Value::Double(0.8))?;
        pendulum.damping.set_value(Value::Double(0.2))?;
        Ok(pendulum)
    }

    fn step(&self, tick: i64) -> Result<()> {
        let q = self.q.value().as_f64();
        let qd = self.qd.value().as_f64();
        let damping = self.damping.value().as_f64();

        let qdd = -GRAVITY / LENGTH * q.sin() - damping * qd;
        let qd = qd + qdd * DT;
        let q = q + qd * DT;

        self.q.set_value(Value::Double(q))?;
        self.qd.set_value(Value::Double(qd))?;
        self.tick.set_value(Value::Long(tick))?;
        self.phase
            .set_value(Value::Enum(Some(if qd < 0.0 { 0 } else { 1 })))?;
        self.saturated.set_value(Value::Bool(q.abs() > 0.75))?;
        Ok(())
    }
}

/// Fills `pendulum.energy` from the recorded state of every sample in the active window.
struct EnergyProcessor {
    q: Option<Arc<Variable>>,
    qd: Option<Arc<Variable>>,
    energy: Option<Arc<Variable>>,
}

impl BufferProcessor for EnergyProcessor {
    fn initialize(&mut self, root: &Registry) {
        self.q = root.find_variable("root.pendulum.q");
        self.qd = root.find_variable("root.pendulum.qd");
        self.energy = root.find_variable("root.pendulum.energy");
    }

    fn process(&mut self, _start: usize, _end: usize, _current: usize) {
        let (Some(q), Some(qd), Some(energy)) = (&self.q, &self.qd, &self.energy) else {
            return;
        };
        let q = q.value().as_f64();
        let qd = qd.value().as_f64();
        let value = 0.5 * LENGTH * LENGTH * qd * qd + GRAVITY * LENGTH * (1.0 - q.cos());
        // The variable is always a double; nothing to report on failure.
        let _ = energy.set_value(Value::Double(value));
    }
}

fn run_consumer(index: usize, factory: LinkedBufferFactory, stop: Receiver<()>) -> Result<ConsumerReport> {
    let registry = factory
        .new_linked_registry(None)?
        .ok_or_else(|| anyhow!("buffer disposed before consumer {index} attached"))?;
    let q = registry
        .root()
        .find_variable("root.pendulum.q")
        .ok_or_else(|| anyhow!("consumer {index}: no pendulum.q"))?;
    let damping = registry
        .root()
        .find_variable("root.pendulum.damping")
        .ok_or_else(|| anyhow!("consumer {index}: no pendulum.damping"))?;

    let linked_q = registry
        .link_variable(&q)?
        .ok_or_else(|| anyhow!("consumer {index}: buffer disposed"))?;
    let linked_damping = registry
        .link_variable(&damping)?
        .ok_or_else(|| anyhow!("consumer {index}: buffer disposed"))?;
    let properties = factory.new_linked_properties();

    let mut report = ConsumerReport::default();
    let poll = Duration::from_micros(CONFIG.poll_micros);
    loop {
        match stop.recv_timeout(poll) {
            Err(RecvTimeoutError::Timeout) => {}
            Ok(()) | Err(RecvTimeoutError::Disconnected) => break,
        }

        if registry.pull() {
            report.pulls += 1;
        }
        if let Some(properties) = &properties {
            properties.pull();
        }

        if let Some(sample) = linked_q.poll_sample() {
            report.samples += 1;
            report.largest_window = report.largest_window.max(sample.length());
        }
        if !linked_q.has_request_pending() {
            linked_q.request_active_buffer_only();
        }

        // The first consumer stiffens the damping once, from its own thread.
        if index == 0 && report.pushes == 0 && report.pulls > 10 {
            linked_damping.variable().set_value(Value::Double(0.5))?;
            linked_damping.push();
            report.pushes += 1;
        }
    }

    registry.dispose();
    if let Some(properties) = properties {
        properties.dispose();
    }
    debug!("consumer {index} done: {report:?}");
    Ok(report)
}

pub fn record(options: &RecordOptions, output: Option<&Path>) -> Result<RecordReport> {
    let root = Registry::new("root")?;
    let pendulum = Pendulum::new(&root)?;
    let size = options.size.unwrap_or(CONFIG.initial_buffer_size);
    let mut buffer = SharedBuffer::new(root.clone(), size);

    let (stop_tx, stop_rx) = bounded::<()>(0);
    let consumers: Vec<_> = (0..options.consumers)
        .map(|index| {
            let factory = buffer.factory();
            let stop = stop_rx.clone();
            thread::spawn(move || run_consumer(index, factory, stop))
        })
        .collect();
    drop(stop_rx);

    let tick_period = Duration::from_micros(CONFIG.tick_micros);
    let mut pushes_applied = 0;
    for tick in 0..options.ticks {
        if buffer.process_linked_push_requests(false) {
            pushes_applied += 1;
        }
        pendulum.step(tick as i64)?;
        if tick > 0 {
            buffer.increment_index(true, 1);
        }
        buffer.write_buffer();
        buffer.prepare_linked_buffers_for_pull();
        if options.realtime {
            thread::sleep(tick_period);
        }
    }
    info!("recorded {} ticks", options.ticks);

    drop(stop_tx);
    let mut consumer_reports = Vec::with_capacity(consumers.len());
    for (index, handle) in consumers.into_iter().enumerate() {
        let report = handle
            .join()
            .map_err(|_| anyhow!("consumer {index} panicked"))??;
        consumer_reports.push(report);
    }

    root.child("pendulum")
        .ok_or_else(|| anyhow!("pendulum registry vanished"))?
        .add_variable("energy", VariableKind::Double)?;
    buffer.apply_processor(&mut EnergyProcessor {
        q: None,
        qd: None,
        energy: None,
    });

    for _ in 0..options.playback_ticks {
        buffer.increment_index(false, CONFIG.playback_step as isize);
        buffer.read_buffer();
    }

    if let Some(path) = output {
        export_buffer(&buffer, &mut ArrowExporter::new(path), None)
            .with_context(|| format!("exporting to {}", path.display()))?;
    }

    let properties = buffer.properties();
    let report = RecordReport {
        ticks: options.ticks,
        variables: buffer.registry_buffer().len(),
        buffer_size: properties.size(),
        active_length: properties.active_buffer_length(),
        frame_bytes: buffer.frame_memory_size(),
        pushes_applied,
        consumers: consumer_reports,
        final_q: pendulum.q.value().as_f64(),
    };
    buffer.dispose();
    Ok(report)
}
