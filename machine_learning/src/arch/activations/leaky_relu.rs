#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LeakyRelu {
    slope: f32,
}

impl LeakyRelu {
    pub fn new(slope: f32) -> Self {
        Self { slope }
    }

    pub fn f(&self, z: f32) -> f32 {
        if z >= 0. { z } else { self.slope * z }
    }
}

impl Default for LeakyRelu {
    /// Matches the slope the pretrained networks were exported with.
    fn default() -> Self {
        Self::new(0.01)
    }
}
