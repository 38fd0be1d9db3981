/*!
This crate holds small utilities shared by the other crates in the workspace: [`Finite`](finite/struct.Finite.html) floats that can be totally ordered, and the random [`Id`](id/struct.Id.html) used to name tracking runs.
*/

pub mod finite;
pub mod id;
