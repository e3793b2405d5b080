// fbler: kind/type algebra, bidirectional type checker, bytecode IR,
// generational GC, and a cooperative interpreter for the Fble language
// family.
//
// Copyright (C) 2019  Brandon Lewis
//
// This program is free software: you can redistribute it and/or
// modify it under the terms of the GNU Lesser General Public License
// as published by the Free Software Foundation, either version 3 of
// the License, or (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the GNU
// Lesser General Public License for more details.
//
// You should have received a copy of the GNU Lesser General Public
// License along with this program.  If not, see
// <https://www.gnu.org/licenses/>.

pub mod ast;
pub mod bytecode;
pub mod config;
pub mod env;
pub mod error;
pub mod heap;
pub mod interp;
pub mod io;
pub mod irgen;
pub mod kind;
pub mod linker;
pub mod profile;
pub mod tc;
pub mod typecheck;
pub mod types;
#[macro_use]
pub mod util;
pub mod value;
pub mod value_heap;
