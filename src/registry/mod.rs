/*!
 * Descriptor Registry & Classification
 */

mod classifier;
mod descriptor;

pub use classifier::DescriptorClassifier;
pub use descriptor::DescriptorRegistry;
