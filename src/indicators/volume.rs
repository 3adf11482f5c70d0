use super::sma;

/// Rolling average volume and the current bar's ratio to it
#[derive(Debug, Clone)]
pub struct VolumeProfile {
    period: usize,
    volumes: Vec<f64>,
    avg_volume: Option<f64>,
}

impl VolumeProfile {
    pub fn new(period: usize) -> Self {
        Self {
            period,
            volumes: Vec::with_capacity(period),
            avg_volume: None,
        }
    }

    pub fn update(&mut self, volume: f64) -> Option<f64> {
        self.volumes.push(volume);
        if self.volumes.len() > self.period {
            self.volumes.remove(0);
        }

        if self.volumes.len() >= self.period {
            self.avg_volume = sma(&self.volumes, self.period);
        }

        self.avg_volume
    }

    /// Plain ratio; non-finite when the average is zero
    pub fn raw_ratio(&self, current_volume: f64) -> Option<f64> {
        self.avg_volume.map(|avg| current_volume / avg)
    }

    /// Ratio that treats a zero average as ordinary volume
    pub fn relative_volume(&self, current_volume: f64) -> Option<f64> {
        self.avg_volume
            .map(|avg| if avg == 0.0 { 1.0 } else { current_volume / avg })
    }
}

/// Volume profile fed with every bar of `volumes`
pub fn volume_profile(volumes: &[f64], period: usize) -> VolumeProfile {
    let mut profile = VolumeProfile::new(period);
    for &volume in volumes {
        profile.update(volume);
    }
    profile
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ratio_includes_current_bar_in_average() {
        let mut volumes = vec![1000.0; 19];
        volumes.push(5000.0);
        let profile = volume_profile(&volumes, 20);
        let ratio = profile.relative_volume(5000.0).unwrap();
        assert!((ratio - 5000.0 / 1200.0).abs() < 1e-12);
    }

    #[test]
    fn test_zero_average() {
        let profile = volume_profile(&[0.0; 20], 20);
        assert_eq!(profile.relative_volume(0.0), Some(1.0));
        assert!(profile.raw_ratio(0.0).unwrap().is_nan());
    }
}
