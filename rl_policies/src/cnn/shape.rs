//! Spatial size arithmetic for convolution and pooling layers.

/// Padding mode of a conv or pool layer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Padding {
    /// Pad so that output = ceil(input / stride).
    Same,
    /// No padding.
    Valid,
}

/// Output length along one spatial axis.
pub fn conv_output_size(input: usize, kernel: usize, stride: usize, padding: Padding) -> usize {
    match padding {
        Padding::Same => input.div_ceil(stride),
        Padding::Valid if input < kernel => 0,
        Padding::Valid => (input - kernel) / stride + 1,
    }
}

/// Pooling follows the same rule as convolution.
pub fn pool_output_size(input: usize, window: usize, stride: usize, padding: Padding) -> usize {
    conv_output_size(input, window, stride, padding)
}

/// `(before, after)` padding of a `Same` layer along one axis.
///
/// When the total is odd the extra pixel goes after, so windows of a
/// stride-2 layer over an even input start at the first pixel.
pub fn same_padding(input: usize, kernel: usize, stride: usize) -> (usize, usize) {
    let output = input.div_ceil(stride);
    let total = (output.saturating_sub(1) * stride + kernel).saturating_sub(input);
    (total / 2, total - total / 2)
}

/// Spatial size `(height, width)` of a feature map.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spatial {
    pub height: usize,
    pub width: usize,
}

impl Spatial {
    pub fn new(height: usize, width: usize) -> Self {
        Self { height, width }
    }

    pub fn conv(self, kernel: usize, stride: usize, padding: Padding) -> Self {
        Self {
            height: conv_output_size(self.height, kernel, stride, padding),
            width: conv_output_size(self.width, kernel, stride, padding),
        }
    }

    pub fn pool(self, window: usize, stride: usize, padding: Padding) -> Self {
        self.conv(window, stride, padding)
    }

    pub fn is_empty(&self) -> bool {
        self.height == 0 || self.width == 0
    }

    pub fn area(&self) -> usize {
        self.height * self.width
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_same_padding_rounds_up() {
        assert_eq!(conv_output_size(64, 3, 1, Padding::Same), 64);
        assert_eq!(pool_output_size(64, 3, 2, Padding::Same), 32);
        assert_eq!(pool_output_size(5, 3, 2, Padding::Same), 3);
        assert_eq!(pool_output_size(1, 3, 2, Padding::Same), 1);
    }

    #[test]
    fn test_same_padding_split() {
        // Even inputs pad only after the last pixel.
        assert_eq!(same_padding(64, 3, 2), (0, 1));
        assert_eq!(same_padding(4, 3, 2), (0, 1));
        assert_eq!(same_padding(5, 3, 2), (1, 1));
        assert_eq!(same_padding(1, 3, 2), (1, 1));
        assert_eq!(same_padding(7, 3, 1), (1, 1));
    }

    #[test]
    fn test_valid_padding() {
        assert_eq!(conv_output_size(64, 8, 4, Padding::Valid), 15);
        assert_eq!(conv_output_size(15, 4, 2, Padding::Valid), 6);
        assert_eq!(conv_output_size(6, 3, 1, Padding::Valid), 4);
        assert_eq!(pool_output_size(62, 3, 2, Padding::Valid), 30);
        assert_eq!(conv_output_size(2, 3, 1, Padding::Valid), 0);
    }

    #[test]
    fn test_spatial_chain() {
        let s = Spatial::new(64, 64)
            .pool(3, 2, Padding::Same)
            .pool(3, 2, Padding::Same)
            .pool(3, 2, Padding::Same);
        assert_eq!(s, Spatial::new(8, 8));
        assert_eq!(s.area(), 64);
        assert!(Spatial::new(4, 0).is_empty());
    }
}
