pub mod alaw;
