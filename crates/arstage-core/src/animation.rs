//! Keyframe animation clips, playback actions and the per-model mixer

use glam::{Quat, Vec3};

use crate::scene::Node;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    Step,
    Linear,
}

/// Keyframe values for one animated property
#[derive(Debug, Clone)]
pub enum ChannelValues {
    Translation(Vec<Vec3>),
    Rotation(Vec<Quat>),
    Scale(Vec<Vec3>),
}

/// One animated property of one node
#[derive(Debug, Clone)]
pub struct Channel {
    /// Child indices leading from the model root to the animated node
    pub target: Vec<usize>,
    pub interpolation: Interpolation,
    /// Keyframe times in seconds, ascending
    pub times: Vec<f32>,
    pub values: ChannelValues,
}

#[derive(Debug, Clone)]
pub struct AnimationClip {
    pub name: Option<String>,
    pub duration: f32,
    pub channels: Vec<Channel>,
}

impl AnimationClip {
    /// Duration is the latest keyframe time across all channels
    pub fn new(name: Option<String>, channels: Vec<Channel>) -> Self {
        let duration = channels
            .iter()
            .filter_map(|c| c.times.last().copied())
            .fold(0.0_f32, f32::max);
        Self {
            name,
            duration,
            channels,
        }
    }
}

/// Playback state of one clip
#[derive(Debug, Clone, Default, PartialEq)]
pub struct AnimationAction {
    time: f32,
    running: bool,
    pub paused: bool,
}

impl AnimationAction {
    /// Start or resume from the current time
    pub fn play(&mut self) {
        self.running = true;
    }

    /// Stop and rewind
    pub fn stop(&mut self) {
        self.running = false;
        self.paused = false;
        self.time = 0.0;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    pub fn time(&self) -> f32 {
        self.time
    }

    fn advance(&mut self, delta: f32, duration: f32) {
        if !self.running || self.paused {
            return;
        }
        self.time += delta;
        if duration > 0.0 {
            self.time = self.time.rem_euclid(duration);
        }
    }
}

#[derive(Debug, Clone)]
struct RestPose {
    target: Vec<usize>,
    translation: Vec3,
    rotation: Quat,
    scale: Vec3,
}

/// Owns the clips of one model and one action per clip
#[derive(Debug, Clone)]
pub struct AnimationMixer {
    clips: Vec<AnimationClip>,
    actions: Vec<AnimationAction>,
    rest: Vec<RestPose>,
}

impl AnimationMixer {
    /// Creates one stopped action per clip and remembers the current pose of
    /// every animated node so stopping can restore it.
    pub fn new(clips: Vec<AnimationClip>, root: &Node) -> Self {
        let mut rest: Vec<RestPose> = Vec::new();
        for channel in clips.iter().flat_map(|c| &c.channels) {
            if rest.iter().any(|r| r.target == channel.target) {
                continue;
            }
            if let Some(node) = root.descendant(&channel.target) {
                rest.push(RestPose {
                    target: channel.target.clone(),
                    translation: node.translation,
                    rotation: node.rotation,
                    scale: node.scale,
                });
            }
        }
        let actions = vec![AnimationAction::default(); clips.len()];
        Self {
            clips,
            actions,
            rest,
        }
    }

    pub fn clips(&self) -> &[AnimationClip] {
        &self.clips
    }

    pub fn actions(&self) -> &[AnimationAction] {
        &self.actions
    }

    /// Clear pause flags and start every action
    pub fn play_all(&mut self) {
        for action in &mut self.actions {
            if action.paused {
                action.paused = false;
            }
            action.play();
        }
    }

    pub fn pause_all(&mut self) {
        for action in &mut self.actions {
            action.paused = true;
        }
    }

    /// Stop every action and put animated nodes back in their rest pose
    pub fn stop_all(&mut self, root: &mut Node) {
        for action in &mut self.actions {
            action.stop();
        }
        for pose in &self.rest {
            if let Some(node) = root.descendant_mut(&pose.target) {
                node.translation = pose.translation;
                node.rotation = pose.rotation;
                node.scale = pose.scale;
            }
        }
    }

    /// Advance running actions by `delta` seconds and write the sampled
    /// values into the model
    pub fn update(&mut self, delta: f32, root: &mut Node) {
        for (action, clip) in self.actions.iter_mut().zip(&self.clips) {
            if !action.running {
                continue;
            }
            action.advance(delta, clip.duration);
            for channel in &clip.channels {
                if let Some(node) = root.descendant_mut(&channel.target) {
                    apply_channel(channel, action.time, node);
                }
            }
        }
    }
}

fn apply_channel(channel: &Channel, time: f32, node: &mut Node) {
    let Some((from, to, factor)) = keyframe_span(&channel.times, time) else {
        return;
    };
    let factor = match channel.interpolation {
        Interpolation::Step => 0.0,
        Interpolation::Linear => factor,
    };
    match &channel.values {
        ChannelValues::Translation(values) => {
            if let (Some(a), Some(b)) = (values.get(from), values.get(to)) {
                node.translation = a.lerp(*b, factor);
            }
        }
        ChannelValues::Rotation(values) => {
            if let (Some(a), Some(b)) = (values.get(from), values.get(to)) {
                node.rotation = a.slerp(*b, factor);
            }
        }
        ChannelValues::Scale(values) => {
            if let (Some(a), Some(b)) = (values.get(from), values.get(to)) {
                node.scale = a.lerp(*b, factor);
            }
        }
    }
}

/// Keyframe indices surrounding `time` and the blend factor between them.
/// Times outside the keyframe range clamp to the first or last key.
fn keyframe_span(times: &[f32], time: f32) -> Option<(usize, usize, f32)> {
    let last = times.len().checked_sub(1)?;
    if time <= times[0] {
        return Some((0, 0, 0.0));
    }
    if time >= times[last] {
        return Some((last, last, 0.0));
    }
    let next = times.partition_point(|&t| t <= time);
    let prev = next - 1;
    let span = times[next] - times[prev];
    let factor = if span > 0.0 {
        (time - times[prev]) / span
    } else {
        0.0
    };
    Some((prev, next, factor))
}
