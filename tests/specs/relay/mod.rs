mod cancellation;
mod data_loss;
