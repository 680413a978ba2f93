pub mod libtest;
