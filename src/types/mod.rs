pub mod lesson;
