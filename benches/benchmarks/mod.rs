pub mod sum_reduction;
