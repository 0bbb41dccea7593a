//! Per-frame tunables

/// Tonemapping operator
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TonemapOperator {
    Reinhard,
    #[default]
    Aces,
    Uncharted2,
    None,
}

impl TonemapOperator {
    pub const ALL: [TonemapOperator; 4] = [
        TonemapOperator::Reinhard,
        TonemapOperator::Aces,
        TonemapOperator::Uncharted2,
        TonemapOperator::None,
    ];

    /// Value of the operator switch in the composite shader
    pub fn shader_index(&self) -> u32 {
        match self {
            TonemapOperator::Reinhard => 0,
            TonemapOperator::Aces => 1,
            TonemapOperator::Uncharted2 => 2,
            TonemapOperator::None => 3,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            TonemapOperator::Reinhard => "Reinhard",
            TonemapOperator::Aces => "ACES",
            TonemapOperator::Uncharted2 => "Uncharted 2",
            TonemapOperator::None => "None",
        }
    }
}

/// Values re-uploaded with every frame. Change them freely between `render_frame` calls.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RenderSettings {
    pub exposure: f32,
    pub gamma: f32,
    pub tonemap: TonemapOperator,
    /// Weight of the bloom chain in the composite, 0 disables it visually
    pub bloom_strength: f32,
    /// Luminance where the prefilter starts letting light into the bloom chain
    pub bloom_threshold: f32,
    /// Width of the soft knee around the threshold, as a fraction of it
    pub bloom_knee: f32,
    /// Upsample tent filter radius in uv units
    pub bloom_filter_radius: f32,
    /// Scales the procedural sky and the ambient term
    pub environment_intensity: f32,
    pub shadow_bias: f32,
}

impl Default for RenderSettings {
    fn default() -> Self {
        Self {
            exposure: 1.0,
            gamma: 2.2,
            tonemap: TonemapOperator::Aces,
            bloom_strength: 0.04,
            bloom_threshold: 1.0,
            bloom_knee: 0.5,
            bloom_filter_radius: 0.005,
            environment_intensity: 1.0,
            shadow_bias: 0.002,
        }
    }
}
