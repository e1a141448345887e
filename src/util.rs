/// Elements with a width (eg. verification types, which occupy one or two slots)
pub trait Width {
    fn width(&self) -> usize;
}
